//! RTU frame codec
//!
//! Frames are held in a fixed-size stack buffer sized for the largest response the
//! terminal accepts ([`MAX_FRAME_LEN`]). Every write into the buffer is bounds-checked
//! and reports [`ProtocolError::FrameOverflow`] instead of panicking.
//!
//! ```text
//! request : [addr][fc][regHi][regLo][valHi][valLo][crcLo][crcHi]
//! response: [addr][0x03][byteCount][data...][crcLo][crcHi]
//! ```

use crc::{Crc, CRC_16_MODBUS};
use tracing::debug;

use crate::constants::{
    CRC_LEN, FC_READ_HOLDING_REGISTERS, FC_WRITE_SINGLE_REGISTER, MAX_FRAME_LEN,
    REQUEST_FRAME_LEN,
};
use crate::error::{ProtocolError, ProtocolResult};

/// CRC-16/MODBUS: poly 0x8005 reflected (0xA001), init 0xFFFF
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the CRC-16/MODBUS checksum of `data`.
#[inline]
pub fn compute_crc(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Check the trailing little-endian CRC of a complete frame.
pub fn verify_crc(frame: &[u8]) -> ProtocolResult<()> {
    // address + function + CRC
    if frame.len() < 2 + CRC_LEN {
        return Err(ProtocolError::UnexpectedByteCount {
            expected: 2 + CRC_LEN,
            actual: frame.len(),
        });
    }

    let body_len = frame.len() - CRC_LEN;
    let received = u16::from_le_bytes([frame[body_len], frame[body_len + 1]]);
    let calculated = compute_crc(&frame[..body_len]);

    if received != calculated {
        return Err(ProtocolError::CrcMismatch {
            expected: calculated,
            actual: received,
        });
    }
    Ok(())
}

/// Format raw bytes as a hex string for packet logging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fixed-capacity frame buffer
#[derive(Clone)]
pub struct Frame {
    /// Fixed-size buffer (stack)
    data: [u8; MAX_FRAME_LEN],
    /// Actual data length
    len: usize,
}

impl Frame {
    /// Create an empty frame
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_FRAME_LEN],
            len: 0,
        }
    }

    /// Create a frame from a byte slice
    pub fn from_slice(data: &[u8]) -> ProtocolResult<Self> {
        let mut frame = Self::new();
        frame.extend(data)?;
        Ok(frame)
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> ProtocolResult<()> {
        if self.len >= MAX_FRAME_LEN {
            return Err(ProtocolError::FrameOverflow {
                len: self.len + 1,
                capacity: MAX_FRAME_LEN,
            });
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> ProtocolResult<()> {
        self.extend(&value.to_be_bytes())
    }

    /// Extend with a byte slice
    #[inline]
    pub fn extend(&mut self, data: &[u8]) -> ProtocolResult<()> {
        let new_len = self.len + data.len();
        if new_len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameOverflow {
                len: new_len,
                capacity: MAX_FRAME_LEN,
            });
        }
        self.data[self.len..new_len].copy_from_slice(data);
        self.len = new_len;
        Ok(())
    }

    /// Append the CRC of the current contents, low byte first
    pub fn push_crc(&mut self) -> ProtocolResult<()> {
        let crc = compute_crc(self.as_slice());
        self.extend(&crc.to_le_bytes())
    }

    /// Get immutable data slice
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Get current length
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Clear frame
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Slave address (first byte)
    #[inline]
    pub fn address(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    /// Function code (second byte)
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().get(1).copied()
    }

    /// Get human-readable function code description
    pub fn function_code_description(fc: u8) -> &'static str {
        match fc & 0x7F {
            FC_READ_HOLDING_REGISTERS => "Read Holding Registers",
            FC_WRITE_SINGLE_REGISTER => "Write Single Register",
            _ => "Unsupported Function",
        }
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame[{}]", format_hex(self.as_slice()))
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Frame {}

/// Frame builder - fluent API
pub struct FrameBuilder {
    frame: Frame,
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuilder {
    /// Create a new builder
    #[inline]
    pub fn new() -> Self {
        Self {
            frame: Frame::new(),
        }
    }

    /// Set slave address
    #[inline]
    pub fn address(mut self, address: u8) -> ProtocolResult<Self> {
        self.frame.push(address)?;
        Ok(self)
    }

    /// Set function code
    #[inline]
    pub fn function_code(mut self, fc: u8) -> ProtocolResult<Self> {
        self.frame.push(fc)?;
        Ok(self)
    }

    /// Add a big-endian word (register address, value or quantity)
    #[inline]
    pub fn word(mut self, value: u16) -> ProtocolResult<Self> {
        self.frame.push_u16(value)?;
        Ok(self)
    }

    /// Add a byte
    #[inline]
    pub fn byte(mut self, b: u8) -> ProtocolResult<Self> {
        self.frame.push(b)?;
        Ok(self)
    }

    /// Add register values as big-endian words
    pub fn registers(mut self, values: &[u16]) -> ProtocolResult<Self> {
        for &value in values {
            self.frame.push_u16(value)?;
        }
        Ok(self)
    }

    /// Append the CRC and return the finished frame
    pub fn build(mut self) -> ProtocolResult<Frame> {
        self.frame.push_crc()?;

        if let Some(fc) = self.frame.function_code() {
            debug!(
                "Frame built: FC={:02X} ({}), total_len={}",
                fc,
                Frame::function_code_description(fc),
                self.frame.len()
            );
        }

        Ok(self.frame)
    }
}

/// Build an FC06 Write Single Register request.
pub fn build_write_frame(address: u8, register: u16, value: u16) -> Frame {
    build_request(address, FC_WRITE_SINGLE_REGISTER, register, value)
}

/// Build an FC03 Read Holding Registers request.
pub fn build_read_frame(address: u8, start_register: u16, count: u16) -> Frame {
    build_request(address, FC_READ_HOLDING_REGISTERS, start_register, count)
}

/// Requests are always 8 bytes, well inside the buffer capacity.
fn build_request(address: u8, function: u8, register: u16, value: u16) -> Frame {
    let mut frame = Frame::new();
    let [reg_hi, reg_lo] = register.to_be_bytes();
    let [val_hi, val_lo] = value.to_be_bytes();
    frame.data[..6].copy_from_slice(&[address, function, reg_hi, reg_lo, val_hi, val_lo]);
    let [crc_lo, crc_hi] = compute_crc(&frame.data[..6]).to_le_bytes();
    frame.data[6] = crc_lo;
    frame.data[7] = crc_hi;
    frame.len = REQUEST_FRAME_LEN;
    frame
}

/// Fields of an 8-byte request (or FC06 echo) frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFields {
    /// Slave address
    pub address: u8,
    /// Function code
    pub function: u8,
    /// Register address (start register for FC03)
    pub register: u16,
    /// Written value (FC06) or register count (FC03)
    pub value: u16,
}

/// Decode and CRC-check an 8-byte request or FC06 echo frame.
pub fn decode_request(frame: &[u8]) -> ProtocolResult<RequestFields> {
    if frame.len() != REQUEST_FRAME_LEN {
        return Err(ProtocolError::UnexpectedByteCount {
            expected: REQUEST_FRAME_LEN,
            actual: frame.len(),
        });
    }
    verify_crc(frame)?;

    Ok(RequestFields {
        address: frame[0],
        function: frame[1],
        register: u16::from_be_bytes([frame[2], frame[3]]),
        value: u16::from_be_bytes([frame[4], frame[5]]),
    })
}
