//! Session lifecycle and token persistence.

mod storage;
mod store;

pub use storage::{FileTokenStorage, MemoryTokenStorage, StorageError, TokenStorage};
pub use store::{SessionEvent, SessionStore, Surface};
