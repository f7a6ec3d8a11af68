pub mod auto_hide;
pub mod view;

pub use auto_hide::spawn_auto_hide;
pub use view::{grouped_view, BadgeIcon};
