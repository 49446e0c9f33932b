mod friend;
mod item_type;
mod run_session;
mod sync_entry;
mod user;

pub use friend::{Friend, FriendStatus};
pub use item_type::{ItemType, Operation};
pub use run_session::RunSession;
pub use sync_entry::SyncQueueEntry;
pub use user::User;
