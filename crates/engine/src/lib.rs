pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod state;

pub use config::ClientConfig;
pub use error::EngineError;
pub use http::HttpRemote;
pub use reconcile::{ReconcileReport, ReconcileStatus, Reconciler};
pub use remote::{RemoteDraft, RemoteError, RemoteNote, RemoteNotes, RemoteUpdate};
pub use session::{Session, SessionFile, SessionUser};
pub use state::{NotesSnapshot, NotesState, SubscriptionId};
