//! Link protocol constants and the metering device's register map
//!
//! The meter speaks a fixed subset of Modbus RTU: Read Holding Registers (FC03)
//! and Write Single Register (FC06), addressed to one slave with a fixed layout.

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Length of every request frame and of the FC06 echo response
/// Format: Address(1) + Function(1) + Register(2) + Value/Count(2) + CRC(2) = 8 bytes
pub const REQUEST_FRAME_LEN: usize = 8;

/// Read response header: Address(1) + Function(1) + Byte Count(1)
pub const READ_HEADER_LEN: usize = 3;

/// Trailing CRC length, transmitted low byte first
pub const CRC_LEN: usize = 2;

/// Maximum register data bytes accepted in a single read response
///
/// This is the fixed receive limit of the terminal, not the Modbus maximum
/// of 250 bytes.
pub const MAX_RESPONSE_DATA_BYTES: usize = 64;

/// Capacity of a frame buffer
///
/// Calculation:
/// - Read header: 3 bytes (READ_HEADER_LEN)
/// - Register data: 64 bytes (MAX_RESPONSE_DATA_BYTES)
/// - CRC: 2 bytes (CRC_LEN)
/// - Total: 3 + 64 + 2 = 69 bytes
pub const MAX_FRAME_LEN: usize = READ_HEADER_LEN + MAX_RESPONSE_DATA_BYTES + CRC_LEN;

/// Maximum number of registers for a single FC03 request
///
/// N × 2 ≤ MAX_RESPONSE_DATA_BYTES → N ≤ 32
pub const MAX_READ_REGISTERS: u16 = (MAX_RESPONSE_DATA_BYTES / 2) as u16;

// ============================================================================
// Function Codes
// ============================================================================

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

// ============================================================================
// Register Map
// ============================================================================

/// Control command register (write-only)
pub const REG_CONTROL_CMD: u16 = 0;

/// Status flags register
pub const REG_STATUS_FLAGS: u16 = 1;

/// Session volume, high word (centiliters)
pub const REG_SESSION_VOL_H: u16 = 2;

/// Session volume, low word (centiliters)
pub const REG_SESSION_VOL_L: u16 = 3;

/// Lifetime total volume, high word (centiliters)
pub const REG_TOTAL_VOL_H: u16 = 4;

/// Lifetime total volume, low word (centiliters)
pub const REG_TOTAL_VOL_L: u16 = 5;

/// Flow rate (centiliters per minute)
pub const REG_FLOW_RATE: u16 = 6;

/// Registers read by one meter poll: status flags through flow rate
pub const METER_POLL_REGISTER_COUNT: u16 = REG_FLOW_RATE - REG_STATUS_FLAGS + 1;

/// Value written to [`REG_CONTROL_CMD`] to start a dispensing session
pub const CMD_START_SESSION: u16 = 1;

// ============================================================================
// Status Flag Bits
// ============================================================================

/// Meter is ready
pub const STATUS_READY_BIT: u16 = 1 << 0;

/// A dispensing session is in progress
pub const STATUS_SESSION_ACTIVE_BIT: u16 = 1 << 1;

/// Meter reports an error condition
pub const STATUS_ERROR_BIT: u16 = 1 << 2;

/// Fuel is currently flowing
pub const STATUS_FLOW_ACTIVE_BIT: u16 = 1 << 3;

// ============================================================================
// Reference Deployment Defaults
// ============================================================================

/// Slave address of the metering device
pub const DEFAULT_SLAVE_ADDRESS: u8 = 1;

/// Serial line speed (8N1)
pub const DEFAULT_BAUD_RATE: u32 = 19_200;

/// Interval between meter polls during a session
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 300;

/// Deadline for the FC06 echo
pub const DEFAULT_WRITE_TIMEOUT_MS: u32 = 100;

/// Deadline for each part (header, data) of an FC03 response
pub const DEFAULT_READ_TIMEOUT_MS: u32 = 100;

/// How long the session summary stays on screen before returning to idle
pub const DEFAULT_SUMMARY_DISPLAY_MS: u32 = 3_000;

/// Maximum number of registered driver cards
pub const MAX_DRIVER_CARDS: usize = 20;

/// Highest valid Modbus slave address
pub const MAX_SLAVE_ADDRESS: u8 = 247;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_constants() {
        assert_eq!(REQUEST_FRAME_LEN, 8);
        assert_eq!(MAX_FRAME_LEN, 69);
        assert_eq!(MAX_READ_REGISTERS, 32);
    }

    #[test]
    fn test_poll_block_fits_response_buffer() {
        assert_eq!(METER_POLL_REGISTER_COUNT, 6);
        let data_bytes = METER_POLL_REGISTER_COUNT as usize * 2;
        assert!(READ_HEADER_LEN + data_bytes + CRC_LEN <= MAX_FRAME_LEN);
    }

    #[test]
    fn test_status_bits_are_distinct() {
        let bits = [
            STATUS_READY_BIT,
            STATUS_SESSION_ACTIVE_BIT,
            STATUS_ERROR_BIT,
            STATUS_FLOW_ACTIVE_BIT,
        ];
        let combined = bits.iter().fold(0u16, |acc, b| acc | b);
        assert_eq!(combined.count_ones(), 4);
    }
}
