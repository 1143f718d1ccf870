//! Error types for the meter link and terminal configuration
//!
//! Every failure on the link is local and recoverable: transports and the register
//! client return a [`ProtocolError`] to the caller and never abort the process.

use thiserror::Error;

/// Result type for link-level operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while exchanging frames with the metering device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than expected arrived before the deadline
    #[error("Timeout during {operation}: received {received}/{expected} bytes within {timeout_ms}ms")]
    Timeout {
        operation: String,
        expected: usize,
        received: usize,
        timeout_ms: u64,
    },

    /// Trailing CRC does not match the CRC computed over the frame
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    /// Response came from another slave or carries another function code
    #[error(
        "Address/function mismatch: expected {expected_address}/0x{expected_function:02X}, \
         got {actual_address}/0x{actual_function:02X}"
    )]
    AddressOrFunctionMismatch {
        expected_address: u8,
        expected_function: u8,
        actual_address: u8,
        actual_function: u8,
    },

    /// Write echo does not repeat the register/value that was sent
    #[error(
        "Echo mismatch: sent register {register}=0x{value:04X}, \
         echoed register {echoed_register}=0x{echoed_value:04X}"
    )]
    EchoMismatch {
        register: u16,
        value: u16,
        echoed_register: u16,
        echoed_value: u16,
    },

    /// Read response byte count differs from `2 * requested registers`
    #[error("Unexpected byte count: expected {expected}, got {actual}")]
    UnexpectedByteCount { expected: usize, actual: usize },

    /// Requested register count is outside the supported range
    #[error("Invalid register quantity {quantity} (allowed 1-{max})")]
    InvalidQuantity { quantity: u16, max: u16 },

    /// A frame would exceed the fixed buffer capacity
    #[error("Frame overflow: {len} bytes exceeds capacity {capacity}")]
    FrameOverflow { len: usize, capacity: usize },

    /// Serial port I/O failure
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl ProtocolError {
    /// Create a timeout error
    pub fn timeout(
        operation: impl Into<String>,
        expected: usize,
        received: usize,
        timeout_ms: u64,
    ) -> Self {
        Self::Timeout {
            operation: operation.into(),
            expected,
            received,
            timeout_ms,
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Check if the error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the error came from validating a response that did arrive
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::CrcMismatch { .. }
                | Self::AddressOrFunctionMismatch { .. }
                | Self::EchoMismatch { .. }
                | Self::UnexpectedByteCount { .. }
        )
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Errors raised while loading or validating the terminal configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration text is not valid TOML for the expected schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its allowed range
    #[error("Invalid config value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    /// Create a validation error
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = ProtocolError::timeout("read header", 3, 1, 100);
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Timeout during read header: received 1/3 bytes within 100ms"
        );
    }

    #[test]
    fn test_validation_failure_classification() {
        assert!(ProtocolError::CrcMismatch {
            expected: 0x1234,
            actual: 0x4321
        }
        .is_validation_failure());
        assert!(ProtocolError::UnexpectedByteCount {
            expected: 12,
            actual: 10
        }
        .is_validation_failure());
        assert!(!ProtocolError::timeout("write echo", 8, 0, 100).is_validation_failure());
        assert!(!ProtocolError::io("port closed").is_validation_failure());
    }

    #[test]
    fn test_io_conversion() {
        let err: ProtocolError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone").into();
        assert_eq!(err, ProtocolError::io("pipe gone"));
    }
}
