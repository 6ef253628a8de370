pub mod events;
pub mod models;

pub use events::{ChangeEvent, ChangeKind};
pub use models::{MessageInsert, MessageRow, MessageUpdate};
