//! Meter register decoding
//!
//! One poll reads registers 1 through 6. Volumes are 32-bit centiliter counters
//! split across two registers, high word first.

use crate::constants::{
    METER_POLL_REGISTER_COUNT, STATUS_ERROR_BIT, STATUS_FLOW_ACTIVE_BIT, STATUS_READY_BIT,
    STATUS_SESSION_ACTIVE_BIT,
};
use crate::error::{ProtocolError, ProtocolResult};

/// Convert centiliters (or centiliters per minute) to liters.
#[inline]
pub fn centiliters_to_liters(centiliters: u32) -> f64 {
    centiliters as f64 / 100.0
}

/// Status flags register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags(pub u16);

impl StatusFlags {
    /// Raw register value
    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn is_ready(self) -> bool {
        self.0 & STATUS_READY_BIT != 0
    }

    /// Session-active bit; its falling edge ends a session
    pub fn is_session_active(self) -> bool {
        self.0 & STATUS_SESSION_ACTIVE_BIT != 0
    }

    pub fn has_error(self) -> bool {
        self.0 & STATUS_ERROR_BIT != 0
    }

    pub fn is_flow_active(self) -> bool {
        self.0 & STATUS_FLOW_ACTIVE_BIT != 0
    }
}

/// One decoded meter poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeterReading {
    pub status: StatusFlags,
    /// Dispensed this session
    pub session_volume_cl: u32,
    /// Lifetime counter
    pub total_volume_cl: u32,
    pub flow_rate_cl_per_min: u16,
}

impl MeterReading {
    /// Decode the six-register block starting at the status register.
    pub fn from_registers(registers: &[u16]) -> ProtocolResult<Self> {
        let expected = METER_POLL_REGISTER_COUNT as usize;
        if registers.len() != expected {
            return Err(ProtocolError::UnexpectedByteCount {
                expected: expected * 2,
                actual: registers.len() * 2,
            });
        }

        Ok(Self {
            status: StatusFlags(registers[0]),
            session_volume_cl: join_words(registers[1], registers[2]),
            total_volume_cl: join_words(registers[3], registers[4]),
            flow_rate_cl_per_min: registers[5],
        })
    }

    /// Session volume in liters
    pub fn session_volume_liters(&self) -> f64 {
        centiliters_to_liters(self.session_volume_cl)
    }

    /// Lifetime volume in liters
    pub fn total_volume_liters(&self) -> f64 {
        centiliters_to_liters(self.total_volume_cl)
    }

    /// Flow rate in liters per minute
    pub fn flow_rate_liters_per_min(&self) -> f64 {
        centiliters_to_liters(self.flow_rate_cl_per_min as u32)
    }
}

#[inline]
fn join_words(high: u16, low: u16) -> u32 {
    ((high as u32) << 16) | low as u32
}
