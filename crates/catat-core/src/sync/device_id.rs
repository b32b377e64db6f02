//! Per-device identity.
//!
//! Every device writing to the shared remote carries a stable id of the
//! form `catat-<uuid>`, minted once and persisted next to the database.

use std::fs;
use std::io::Write;
use std::path::Path;

use uuid::Uuid;

const DEVICE_ID_FILE: &str = "device_id.txt";
const DEVICE_ID_PREFIX: &str = "catat-";

#[derive(Debug, thiserror::Error)]
pub enum DeviceIdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid device id format: {0}")]
    InvalidFormat(String),
}

/// Read the device id from `device_id.txt` under `path`, minting and
/// persisting a fresh one on first run. A malformed stored id is an error
/// rather than silently replaced: replacing it would fork the device's
/// sync history.
pub fn get_or_create_device_id_at(path: &Path) -> Result<String, DeviceIdError> {
    let device_id_path = path.join(DEVICE_ID_FILE);

    if device_id_path.exists() {
        let content = fs::read_to_string(&device_id_path)?;
        let device_id = content.trim().to_string();
        if device_id.starts_with(DEVICE_ID_PREFIX) {
            return Ok(device_id);
        }
        return Err(DeviceIdError::InvalidFormat(device_id));
    }

    let device_id = format!("{}{}", DEVICE_ID_PREFIX, Uuid::new_v4());

    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    let mut file = fs::File::create(&device_id_path)?;
    writeln!(file, "{device_id}")?;

    Ok(device_id)
}

/// Device id from the default data directory.
pub fn get_or_create_device_id() -> Result<String, DeviceIdError> {
    let dir = crate::config::data_dir()?;
    get_or_create_device_id_at(&dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn minted_id_has_prefix_and_uuid() {
        let dir = TempDir::new().unwrap();
        let id = get_or_create_device_id_at(dir.path()).unwrap();
        assert!(id.starts_with(DEVICE_ID_PREFIX));
        assert_eq!(id.len(), DEVICE_ID_PREFIX.len() + 36);
    }

    #[test]
    fn id_is_stable_across_calls() {
        let dir = TempDir::new().unwrap();
        let first = get_or_create_device_id_at(dir.path()).unwrap();
        let second = get_or_create_device_id_at(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_directory_is_created() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("data/catat");
        let id = get_or_create_device_id_at(&nested).unwrap();
        assert!(nested.exists());
        assert!(id.starts_with(DEVICE_ID_PREFIX));
    }

    #[test]
    fn malformed_stored_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DEVICE_ID_FILE), "some-other-id\n").unwrap();
        let err = get_or_create_device_id_at(dir.path()).unwrap_err();
        assert!(matches!(err, DeviceIdError::InvalidFormat(_)));
    }

    #[test]
    fn two_directories_get_distinct_ids() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        assert_ne!(
            get_or_create_device_id_at(a.path()).unwrap(),
            get_or_create_device_id_at(b.path()).unwrap()
        );
    }
}
