pub mod clock;
pub mod error;
pub mod ids;
pub mod note;
pub mod validation;

pub use clock::{FlashClock, Timestamp};
pub use error::CoreError;
pub use ids::*;
pub use note::{NewNote, Note, NotePatch};
