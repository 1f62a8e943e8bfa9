//! # Validation Module
//!
//! Input validation for values that end up on the wire or in storage.
//!
//! ## Usage
//! ```rust,no_run
//! use boxlink_core::validation::{validate_device_id, validate_network_address};
//!
//! validate_network_address("192.168.1.20:8069").unwrap();
//! validate_device_id("printer_usb_0").unwrap();
//! ```

use crate::error::ValidationError;
use crate::MAX_DEVICE_ID_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of a box identity.
const MAX_IDENTITY_LEN: usize = 128;

/// Maximum length of a host name (RFC 1035).
const MAX_HOST_LEN: usize = 253;

// =============================================================================
// Box Fields
// =============================================================================

/// Validates the network address of a box.
///
/// ## Rules
/// - Must not be empty
/// - Bare `host` or `host:port`, no scheme and no path
/// - Port, when present, must be 1-65535
///
/// ## Example
/// ```rust
/// use boxlink_core::validation::validate_network_address;
///
/// assert!(validate_network_address("iot-box.local").is_ok());
/// assert!(validate_network_address("http://10.0.0.2").is_err());
/// assert!(validate_network_address("10.0.0.2:0").is_err());
/// ```
pub fn validate_network_address(address: &str) -> ValidationResult<()> {
    let address = address.trim();
    let field = "network_address";

    if address.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if address.contains("://") || address.contains('/') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "expected host[:port] without scheme or path".to_string(),
        });
    }

    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => (host, Some(port)),
        _ => (address, None),
    };

    if host.is_empty() || host.len() > MAX_HOST_LEN {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "invalid host".to_string(),
        });
    }

    if host.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "host contains whitespace".to_string(),
        });
    }

    if let Some(port) = port {
        match port.parse::<u16>() {
            Ok(p) if p > 0 => {}
            _ => {
                return Err(ValidationError::OutOfRange {
                    field: "port".to_string(),
                    min: 1,
                    max: 65535,
                })
            }
        }
    }

    Ok(())
}

/// Validates a box identity (relay channel name).
pub fn validate_identity(identity: &str) -> ValidationResult<()> {
    validate_token_like("identity", identity, MAX_IDENTITY_LEN)
}

/// Validates a device identifier on a box.
pub fn validate_device_id(device_id: &str) -> ValidationResult<()> {
    validate_token_like("device_id", device_id, MAX_DEVICE_ID_LEN)
}

/// Validates the session token scoping the blackbox queue key.
pub fn validate_session_token(token: &str) -> ValidationResult<()> {
    validate_token_like("session.token", token, MAX_IDENTITY_LEN)
}

fn validate_token_like(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_address() {
        assert!(validate_network_address("192.168.1.20").is_ok());
        assert!(validate_network_address("192.168.1.20:8069").is_ok());
        assert!(validate_network_address("iot-box.local").is_ok());

        assert!(validate_network_address("").is_err());
        assert!(validate_network_address("https://box").is_err());
        assert!(validate_network_address("box/path").is_err());
        assert!(validate_network_address("box:99999").is_err());
        assert!(validate_network_address("my box").is_err());
    }

    #[test]
    fn test_device_id() {
        assert!(validate_device_id("printer_usb_0").is_ok());
        assert!(validate_device_id(" ").is_err());
        assert!(validate_device_id("a b").is_err());
        assert!(validate_device_id(&"x".repeat(MAX_DEVICE_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_identity_and_token() {
        assert!(validate_identity("a1b2c3d4e5").is_ok());
        assert!(validate_identity("").is_err());
        assert!(validate_session_token("f3e1c0ffee").is_ok());
        assert!(matches!(
            validate_session_token(""),
            Err(ValidationError::Required { .. })
        ));
    }
}
