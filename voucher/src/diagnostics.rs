//! Out-of-band operations for testing a device on site.
//!
//! Nothing here is reachable from the normal navigation flow.

use crate::binding::DeviceBindingStore;
use crate::config::Config;
use crate::error::BindingError;

/// Forget this device's ticket so it can request a new one
///
/// # Errors
///
/// Returns [`BindingError::DiagnosticsDisabled`] unless diagnostics are
/// enabled in `config`, or the store's error if the record cannot be removed.
pub fn reset_device_binding(
    config: &Config,
    bindings: &dyn DeviceBindingStore,
) -> Result<(), BindingError> {
    if !config.diagnostics {
        tracing::warn!("Binding reset refused, diagnostics are disabled");
        return Err(BindingError::DiagnosticsDisabled);
    }

    bindings.clear()?;
    tracing::info!("Device binding cleared");
    Ok(())
}
