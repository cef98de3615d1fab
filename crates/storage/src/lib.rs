pub mod error;
pub mod facade;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use facade::{NoteStorage, StoreLocation};
pub use sqlite::SqliteNoteStore;
pub use traits::*;
