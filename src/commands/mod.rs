pub mod inspect;
pub mod sync;

// Re-export all command functions
pub use inspect::cmd_inspect;
pub use sync::{SyncArgs, SyncOutcome, cmd_sync};
