//! Durable record tying this device to one issued ticket.
//!
//! The record is written once, after the first successful issuance, and only
//! removed by the diagnostic reset in [`crate::diagnostics`].

use crate::error::BindingError;
use crate::types::DeviceBinding;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File name of the binding record, versioned so a format change never reads
/// an older record as valid
pub const BINDING_RECORD_NAME: &str = "voucher.device-binding.v1.json";

/// Local key-value store holding at most one [`DeviceBinding`]
///
/// No network access and no validation: whatever was stored is returned.
pub trait DeviceBindingStore: Send + Sync {
    /// The stored binding, if any
    ///
    /// # Errors
    ///
    /// Returns [`BindingError`] if the record exists but cannot be read.
    fn get(&self) -> Result<Option<DeviceBinding>, BindingError>;

    /// Store a binding, replacing any previous record
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Io`] if the record cannot be written.
    fn set(&self, binding: &DeviceBinding) -> Result<(), BindingError>;

    /// Remove the stored binding
    ///
    /// Destructive. Only [`crate::diagnostics::reset_device_binding`] calls this.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::Io`] if the record exists but cannot be removed.
    fn clear(&self) -> Result<(), BindingError>;
}

/// Binding store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryBindingStore {
    binding: Mutex<Option<DeviceBinding>>,
}

impl InMemoryBindingStore {
    /// Create an empty store
    #[must_use]
    pub const fn new() -> Self {
        Self {
            binding: Mutex::new(None),
        }
    }

    /// Create a store that already holds `binding`
    #[must_use]
    pub const fn bound(binding: DeviceBinding) -> Self {
        Self {
            binding: Mutex::new(Some(binding)),
        }
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<DeviceBinding>>, BindingError> {
        self.binding
            .lock()
            .map_err(|_| BindingError::Io(io::Error::other("binding store lock poisoned")))
    }
}

impl DeviceBindingStore for InMemoryBindingStore {
    fn get(&self) -> Result<Option<DeviceBinding>, BindingError> {
        Ok(self.slot()?.clone())
    }

    fn set(&self, binding: &DeviceBinding) -> Result<(), BindingError> {
        *self.slot()? = Some(binding.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), BindingError> {
        *self.slot()? = None;
        Ok(())
    }
}

/// Binding store persisted as one JSON file under a data directory
///
/// Survives process restarts. Writes go to a sibling temp file first and are
/// renamed into place, so a crash mid-write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct FileBindingStore {
    path: PathBuf,
}

impl FileBindingStore {
    /// Store the record as [`BINDING_RECORD_NAME`] inside `data_dir`
    #[must_use]
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(BINDING_RECORD_NAME),
        }
    }

    /// Location of the record on disk
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

impl DeviceBindingStore for FileBindingStore {
    fn get(&self) -> Result<Option<DeviceBinding>, BindingError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn set(&self, binding: &DeviceBinding) -> Result<(), BindingError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let temp = self.temp_path();
        let written = write_record(&temp, binding).and_then(|()| fs::rename(&temp, &self.path));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&temp) {
                tracing::debug!(path = %temp.display(), error = %cleanup, "Temp binding record not removed");
            }
            return Err(BindingError::Io(e));
        }

        tracing::debug!(path = %self.path.display(), token = binding.token.prefix(), "Device binding persisted");
        Ok(())
    }

    fn clear(&self) -> Result<(), BindingError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Serialization failures surface as I/O errors; only reads report corruption.
fn write_record(path: &Path, binding: &DeviceBinding) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    serde_json::to_writer(&mut file, binding).map_err(io::Error::from)?;
    file.flush()?;
    file.sync_all()
}
