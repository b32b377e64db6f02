//! Cross-device synchronization.
//!
//! One logical owner, many devices, one remote record store. Sync runs as
//! discrete rounds fired by named triggers; between rounds nothing talks to
//! the network.

pub mod coordinator;
pub mod device_id;
pub mod types;

pub use coordinator::SyncCoordinator;
pub use device_id::{get_or_create_device_id, get_or_create_device_id_at, DeviceIdError};
pub use types::{RecordKind, SyncOutcome, SyncRecord};
