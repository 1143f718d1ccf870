//! Register client for the metering device
//!
//! Two operations ride on the transport: FC06 Write Single Register (the meter
//! echoes the request) and FC03 Read Holding Registers. Every response is validated
//! end to end before any value reaches the caller; a failed check discards it.
//!
//! | Operation | Checks, in order |
//! |-----------|------------------|
//! | FC06 write | timeout, CRC, address/function, echo |
//! | FC03 read | timeout, address/function, byte count, timeout, CRC |

use std::time::Duration;

use tracing::debug;

use crate::constants::{
    CRC_LEN, DEFAULT_READ_TIMEOUT_MS, DEFAULT_WRITE_TIMEOUT_MS, FC_READ_HOLDING_REGISTERS,
    FC_WRITE_SINGLE_REGISTER, MAX_FRAME_LEN, MAX_READ_REGISTERS, READ_HEADER_LEN,
    REQUEST_FRAME_LEN,
};
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{build_read_frame, build_write_frame, verify_crc};
use crate::transport::{MeterTransport, TransportStats};

/// Register-level access to a slave.
///
/// The session controller depends only on this trait.
pub trait RegisterAccess: Send {
    /// Write single register (function code 0x06).
    ///
    /// Succeeds only when the slave echoes the request byte for byte.
    fn write_single_register(
        &mut self,
        address: u8,
        register: u16,
        value: u16,
    ) -> impl std::future::Future<Output = ProtocolResult<()>> + Send;

    /// Read holding registers (function code 0x03).
    ///
    /// # Arguments
    ///
    /// * `address` - Slave address (1-247)
    /// * `start` - First register
    /// * `count` - Number of registers (1-32)
    ///
    /// # Returns
    ///
    /// Register values in request order.
    fn read_holding_registers(
        &mut self,
        address: u8,
        start: u16,
        count: u16,
    ) -> impl std::future::Future<Output = ProtocolResult<Vec<u16>>> + Send;
}

/// Register client over any [`MeterTransport`].
pub struct RegisterClient<T: MeterTransport> {
    transport: T,
    write_timeout: Duration,
    read_timeout: Duration,
}

impl<T: MeterTransport> RegisterClient<T> {
    /// Create a client with the reference deployment timeouts.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS as u64),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS as u64),
        }
    }

    /// Deadline for the FC06 echo
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Deadline for each part of an FC03 response
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Get reference to the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get mutable reference to the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Get transport statistics
    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }
}

fn check_address_and_function(
    expected_address: u8,
    expected_function: u8,
    actual_address: u8,
    actual_function: u8,
) -> ProtocolResult<()> {
    if actual_address != expected_address || actual_function != expected_function {
        return Err(ProtocolError::AddressOrFunctionMismatch {
            expected_address,
            expected_function,
            actual_address,
            actual_function,
        });
    }
    Ok(())
}

impl<T: MeterTransport> RegisterAccess for RegisterClient<T> {
    async fn write_single_register(
        &mut self,
        address: u8,
        register: u16,
        value: u16,
    ) -> ProtocolResult<()> {
        let request = build_write_frame(address, register, value);
        self.transport.send(request.as_slice()).await?;

        let mut echo = [0u8; REQUEST_FRAME_LEN];
        self.transport.receive(&mut echo, self.write_timeout).await?;

        verify_crc(&echo)?;
        check_address_and_function(address, FC_WRITE_SINGLE_REGISTER, echo[0], echo[1])?;

        let echoed_register = u16::from_be_bytes([echo[2], echo[3]]);
        let echoed_value = u16::from_be_bytes([echo[4], echo[5]]);
        if echoed_register != register || echoed_value != value {
            return Err(ProtocolError::EchoMismatch {
                register,
                value,
                echoed_register,
                echoed_value,
            });
        }

        debug!(
            "FC06 slave={} register={} value=0x{:04X} confirmed",
            address, register, value
        );
        Ok(())
    }

    async fn read_holding_registers(
        &mut self,
        address: u8,
        start: u16,
        count: u16,
    ) -> ProtocolResult<Vec<u16>> {
        if count == 0 || count > MAX_READ_REGISTERS {
            return Err(ProtocolError::InvalidQuantity {
                quantity: count,
                max: MAX_READ_REGISTERS,
            });
        }

        let request = build_read_frame(address, start, count);
        self.transport.send(request.as_slice()).await?;

        let mut response = [0u8; MAX_FRAME_LEN];
        self.transport
            .receive(&mut response[..READ_HEADER_LEN], self.read_timeout)
            .await?;

        check_address_and_function(
            address,
            FC_READ_HOLDING_REGISTERS,
            response[0],
            response[1],
        )?;

        let byte_count = response[2] as usize;
        let expected = count as usize * 2;
        if byte_count != expected {
            return Err(ProtocolError::UnexpectedByteCount {
                expected,
                actual: byte_count,
            });
        }

        let frame_len = READ_HEADER_LEN + byte_count + CRC_LEN;
        self.transport
            .receive(&mut response[READ_HEADER_LEN..frame_len], self.read_timeout)
            .await?;
        verify_crc(&response[..frame_len])?;

        let registers: Vec<u16> = response[READ_HEADER_LEN..READ_HEADER_LEN + byte_count]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        debug!(
            "FC03 slave={} start={} count={} -> {:?}",
            address, start, count, registers
        );
        Ok(registers)
    }
}
