#![forbid(unsafe_code)]

pub mod memory;
pub mod remote;
pub mod repository;
pub mod sqlite;

pub use memory::{CallLog, InMemoryIdentityProvider, InMemoryRepository, Op};
pub use remote::{RestBackend, RestConfig};
pub use repository::{SignedIn, Storage, StorageError};
pub use sqlite::{SqliteInitError, SqliteRepository};
