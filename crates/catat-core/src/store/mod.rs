pub mod local;
pub mod notify;
pub mod remote;

pub use local::LocalStore;
pub use notify::Notifier;
pub use remote::{InMemoryRemote, RemoteStore};

pub use crate::config::data_dir;
