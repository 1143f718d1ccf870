//! # Terminal Configuration
//!
//! Startup configuration for the meter link, the session timers and the registered
//! driver cards. Values default to the reference deployment and can be overridden
//! from a TOML file:
//!
//! ```toml
//! slave_address = 1
//! poll_interval_ms = 300
//! admin_card = "AA55AA55"
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 19200
//!
//! [[drivers]]
//! uid = "04A1B2C3"
//! plate = "34 ABC 123"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::auth::DriverCard;
use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_READ_TIMEOUT_MS, DEFAULT_SLAVE_ADDRESS,
    DEFAULT_SUMMARY_DISPLAY_MS, DEFAULT_WRITE_TIMEOUT_MS, MAX_DRIVER_CARDS, MAX_SLAVE_ADDRESS,
};
use crate::error::ConfigError;

/// Default serial device path
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

/// Serial line settings (always 8N1).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path
    pub port: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Terminal configuration.
///
/// # Example
///
/// ```rust
/// use fuel_terminal::TerminalConfig;
///
/// let config = TerminalConfig::new()
///     .with_slave_address(3)
///     .with_poll_interval_ms(500);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.slave_address, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Meter slave address (1-247)
    pub slave_address: u8,
    /// Interval between meter polls during a session
    pub poll_interval_ms: u32,
    /// Deadline for the start command's echo
    pub write_timeout_ms: u32,
    /// Deadline for each part of a poll response
    pub read_timeout_ms: u32,
    /// How long the summary is shown after a session closes
    pub summary_display_ms: u32,
    /// Log every frame as hex
    pub packet_logging: bool,
    /// Administrator card uid; opens the settings menu instead of a session
    pub admin_card: Option<String>,
    pub serial: SerialConfig,
    pub drivers: Vec<DriverCard>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            slave_address: DEFAULT_SLAVE_ADDRESS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            summary_display_ms: DEFAULT_SUMMARY_DISPLAY_MS,
            packet_logging: false,
            admin_card: None,
            serial: SerialConfig::default(),
            drivers: Vec::new(),
        }
    }
}

impl TerminalConfig {
    /// Reference deployment defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        debug!(
            "Loaded config from {}: slave={}, {} driver cards",
            path.display(),
            config.slave_address,
            config.drivers.len()
        );
        Ok(config)
    }

    /// Check every value against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slave_address == 0 || self.slave_address > MAX_SLAVE_ADDRESS {
            return Err(ConfigError::invalid(
                "slave_address",
                format!("{} is outside 1-{}", self.slave_address, MAX_SLAVE_ADDRESS),
            ));
        }

        let durations = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("read_timeout_ms", self.read_timeout_ms),
            ("summary_display_ms", self.summary_display_ms),
        ];
        for (field, value) in durations {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be greater than zero"));
            }
        }

        if self.serial.baud_rate == 0 {
            return Err(ConfigError::invalid("serial.baud_rate", "must be greater than zero"));
        }

        if self
            .admin_card
            .as_deref()
            .is_some_and(|uid| uid.trim().is_empty())
        {
            return Err(ConfigError::invalid("admin_card", "must not be empty"));
        }

        if self.drivers.len() > MAX_DRIVER_CARDS {
            return Err(ConfigError::invalid(
                "drivers",
                format!(
                    "{} cards configured, at most {} allowed",
                    self.drivers.len(),
                    MAX_DRIVER_CARDS
                ),
            ));
        }

        Ok(())
    }

    /// Set the meter slave address
    pub fn with_slave_address(mut self, address: u8) -> Self {
        self.slave_address = address;
        self
    }

    /// Set the poll interval in milliseconds
    pub fn with_poll_interval_ms(mut self, ms: u32) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the start command's echo deadline in milliseconds
    pub fn with_write_timeout_ms(mut self, ms: u32) -> Self {
        self.write_timeout_ms = ms;
        self
    }

    /// Set the per-part poll response deadline in milliseconds
    pub fn with_read_timeout_ms(mut self, ms: u32) -> Self {
        self.read_timeout_ms = ms;
        self
    }

    /// Set how long the summary stays on screen, in milliseconds
    pub fn with_summary_display_ms(mut self, ms: u32) -> Self {
        self.summary_display_ms = ms;
        self
    }

    /// Enable or disable hex logging of every frame
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// Set the administrator card uid
    pub fn with_admin_card(mut self, uid: impl Into<String>) -> Self {
        self.admin_card = Some(uid.into());
        self
    }

    /// Set the serial device and its baud rate
    pub fn with_serial(mut self, port: impl Into<String>, baud_rate: u32) -> Self {
        self.serial = SerialConfig {
            port: port.into(),
            baud_rate,
        };
        self
    }

    /// Register a driver card
    pub fn with_driver(mut self, card: DriverCard) -> Self {
        self.drivers.push(card);
        self
    }

    /// Poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms as u64)
    }

    /// Write timeout as a [`Duration`]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms as u64)
    }

    /// Read timeout as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms as u64)
    }

    /// Summary display time as a [`Duration`]
    pub fn summary_display(&self) -> Duration {
        Duration::from_millis(self.summary_display_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = TerminalConfig::default();
        assert_eq!(config.slave_address, 1);
        assert_eq!(config.poll_interval(), Duration::from_millis(300));
        assert_eq!(config.write_timeout(), Duration::from_millis(100));
        assert_eq!(config.read_timeout(), Duration::from_millis(100));
        assert_eq!(config.summary_display(), Duration::from_millis(3000));
        assert_eq!(config.serial.baud_rate, 19_200);
        assert!(config.drivers.is_empty());
        assert_eq!(config.admin_card, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides() {
        let config = TerminalConfig::from_toml_str(
            r#"
            slave_address = 5
            poll_interval_ms = 500
            packet_logging = true

            [serial]
            port = "/dev/ttyS1"

            [[drivers]]
            uid = "04A1B2C3"
            plate = "34 ABC 123"
            "#,
        )
        .unwrap();

        assert_eq!(config.slave_address, 5);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.write_timeout_ms, 100);
        assert!(config.packet_logging);
        assert_eq!(config.serial.port, "/dev/ttyS1");
        assert_eq!(config.serial.baud_rate, 19_200);
        assert_eq!(config.drivers, vec![DriverCard::new("04A1B2C3", "34 ABC 123")]);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(
            TerminalConfig::from_toml_str("").unwrap(),
            TerminalConfig::default()
        );
    }

    #[test]
    fn test_rejects_bad_slave_address() {
        for address in [0u8, 248] {
            let err = TerminalConfig::new()
                .with_slave_address(address)
                .validate()
                .unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Invalid {
                    field: "slave_address",
                    ..
                }
            ));
        }
        assert!(TerminalConfig::new().with_slave_address(247).validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_durations() {
        let cases = [
            (TerminalConfig::new().with_poll_interval_ms(0), "poll_interval_ms"),
            (TerminalConfig::new().with_write_timeout_ms(0), "write_timeout_ms"),
            (TerminalConfig::new().with_read_timeout_ms(0), "read_timeout_ms"),
            (TerminalConfig::new().with_summary_display_ms(0), "summary_display_ms"),
        ];
        for (config, expected_field) in cases {
            match config.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected_field),
                other => panic!("expected invalid {}, got {:?}", expected_field, other),
            }
        }
    }

    #[test]
    fn test_rejects_too_many_cards() {
        let mut config = TerminalConfig::new();
        for i in 0..=MAX_DRIVER_CARDS {
            config = config.with_driver(DriverCard::new(format!("{:08X}", i), "P"));
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "drivers", .. })
        ));
    }

    #[test]
    fn test_admin_card_from_toml() {
        let config = TerminalConfig::from_toml_str(r#"admin_card = "AA55AA55""#).unwrap();
        assert_eq!(config.admin_card.as_deref(), Some("AA55AA55"));
    }

    #[test]
    fn test_rejects_empty_admin_card() {
        let err = TerminalConfig::new()
            .with_admin_card("  ")
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "admin_card",
                ..
            }
        ));
    }

    #[test]
    fn test_parse_error() {
        let err = TerminalConfig::from_toml_str("slave_address = \"one\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = TerminalConfig::load("/nonexistent/terminal.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
