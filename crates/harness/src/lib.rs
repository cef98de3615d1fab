pub mod device;
pub mod mock;

pub use device::{TestDevice, remote_note};
pub use mock::MockRemote;
