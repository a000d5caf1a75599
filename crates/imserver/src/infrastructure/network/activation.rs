//! Discovery: advertises the private socket address on the session bus.
//!
//! Clients that want an input-method connection ask the well-known name
//! `com.meego.inputmethod.uiserver1` for `address()` and then connect to the
//! returned `unix:path=...` descriptor directly. The session bus is only used
//! for this lookup; all input-context traffic goes over the private socket.
//!
//! Every failure here is non-fatal. Without a session bus the server keeps
//! running on its private socket and logs a warning.

use thiserror::Error;
use tracing::{info, warn};

use crate::infrastructure::storage::config::ActivationConfig;

/// Error type for activation setup.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// Connecting to the session bus or exporting the object failed.
    #[error("session bus unavailable: {0}")]
    Bus(#[from] zbus::Error),
}

/// The object served at the activation path.
pub struct ActivationService {
    address: String,
}

impl ActivationService {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[zbus::interface(name = "com.meego.inputmethod.uiserver1")]
impl ActivationService {
    /// Private transport endpoint of this server.
    #[zbus(name = "address")]
    fn address(&self) -> String {
        self.address.clone()
    }
}

/// Keeps the bus connection (and with it the exported object) alive.
pub struct ActivationGuard {
    connection: zbus::Connection,
}

impl ActivationGuard {
    pub fn unique_name(&self) -> Option<String> {
        self.connection.unique_name().map(|name| name.to_string())
    }
}

/// Exports [`ActivationService`] and requests the well-known name.
///
/// A refused name request is logged and the object stays served.
///
/// # Errors
///
/// [`ActivationError::Bus`] when the session bus cannot be reached or the
/// object cannot be exported.
pub async fn advertise(
    config: &ActivationConfig,
    address: &str,
) -> Result<ActivationGuard, ActivationError> {
    let connection = zbus::connection::Builder::session()?
        .serve_at(config.object_path.as_str(), ActivationService::new(address))?
        .build()
        .await?;

    match connection.request_name(config.bus_name.as_str()).await {
        Ok(()) => info!("advertising {address} as {}", config.bus_name),
        Err(e) => warn!(
            "could not acquire bus name {}: {e}; serving {} anyway",
            config.bus_name, config.object_path
        ),
    }

    Ok(ActivationGuard { connection })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_returns_advertised_address() {
        // Arrange
        let service = ActivationService::new("unix:path=/tmp/imserver-abc/imserver_dbus");

        // Act
        let address = service.address();

        // Assert
        assert_eq!(address, "unix:path=/tmp/imserver-abc/imserver_dbus");
    }

    #[test]
    fn test_bus_error_is_displayed_with_context() {
        let err = ActivationError::from(zbus::Error::Address("no session bus".to_string()));
        assert!(err.to_string().starts_with("session bus unavailable"));
    }
}
