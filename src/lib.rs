//! # Fuel Terminal - Attended Fuel-Dispensing Terminal Engine
//!
//! A driver presents an RFID card, the terminal looks up the vehicle plate, starts
//! a dispensing session on the flow meter and follows it until the meter reports
//! the session finished.
//!
//! The meter is reached over half-duplex RS-485 with a subset of Modbus RTU:
//!
//! | Code | Function | Used for |
//! |------|----------|----------|
//! | 0x03 | Read Holding Registers | polling status, volumes and flow |
//! | 0x06 | Write Single Register | the start-session command |
//!
//! ## Layers
//!
//! - [`frame`]: CRC-16/MODBUS and request frames in a fixed stack buffer
//! - [`transport`]: direction control, stale-byte drain, bounded receive
//! - [`client`]: register reads and writes with full response validation
//! - [`session`]: the polling state machine with falling-edge detection
//! - [`auth`]: card id to plate lookup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fuel_terminal::{CardTable, RegisterClient, RtuLink, SessionController, TerminalConfig};
//! use tokio::sync::mpsc::unbounded_channel;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TerminalConfig::load("terminal.toml")?;
//!
//!     // Any HalfDuplexPort works; a serial port needs the `rtu` feature
//!     let (port, _meter_side) = tokio::io::duplex(256);
//!     let client = RegisterClient::new(RtuLink::new(port))
//!         .with_write_timeout(config.write_timeout())
//!         .with_read_timeout(config.read_timeout());
//!
//!     let cards = CardTable::from_cards(config.drivers.clone())?;
//!     let (events_tx, mut events_rx) = unbounded_channel();
//!     let mut controller = SessionController::new(client, cards, &config, events_tx);
//!
//!     controller
//!         .present_card("04A1B2C3", tokio::time::Instant::now())
//!         .await;
//!     while let Ok(event) = events_rx.try_recv() {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

// ============================================================================
// Link layers
// ============================================================================

/// Error types for the meter link and configuration
pub mod error;

/// Register map and protocol constants
pub mod constants;

/// RTU frame codec with a stack-allocated buffer
pub mod frame;

/// Half-duplex serial transport
pub mod transport;

/// Register client
pub mod client;

// ============================================================================
// Terminal
// ============================================================================

pub mod meter;

pub mod auth;

pub mod bus;

/// Fueling session controller
pub mod session;

pub mod config;

/// Subscriber setup for binaries
pub mod logging;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime ===
pub use tokio;

// === Errors ===
pub use error::{ConfigError, ProtocolError, ProtocolResult};

// === Link ===
pub use client::{RegisterAccess, RegisterClient};
pub use frame::{
    build_read_frame, build_write_frame, compute_crc, decode_request, format_hex, verify_crc,
    Frame, FrameBuilder, RequestFields,
};
pub use transport::{HalfDuplexPort, LinkDirection, MeterTransport, RtuLink, TransportStats};

// === Terminal ===
pub use auth::{uid_to_hex, AuthorizationGate, CardTable, DriverCard};
pub use bus::{BusArbiter, BusOwner, BusSelect, NoopBusSelect};
pub use config::{SerialConfig, TerminalConfig};
pub use meter::{centiliters_to_liters, MeterReading, StatusFlags};
pub use session::{CardOutcome, Session, SessionController, SessionEvent, SessionPhase};

// === Logging ===
pub use logging::init_logging;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
