//! Half-duplex serial transport
//!
//! The meter sits on an RS-485 pair: the terminal must assert the transceiver's
//! driver-enable line while it transmits and release it before the reply starts.
//! [`RtuLink`] owns both the byte stream and the direction state, so nothing else
//! can touch the line while an exchange is in flight.
//!
//! ```text
//!  send:    drain stale RX -> TX on -> write -> flush -> wire time -> RX on
//!  receive: poll every 1 ms until the buffer is full or the deadline passes
//! ```

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, trace, warn};

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::format_hex;

/// Delay between receive polls when no byte is available
const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Size of the scratch buffer used to discard stale bytes
const DRAIN_CHUNK: usize = 64;

/// Bits per character on an 8N1 line (start + 8 data + stop, plus one bit of margin)
const BITS_PER_CHAR: u64 = 11;

// ============================================================================
// Port abstraction
// ============================================================================

/// Byte stream with a transmit-enable line.
///
/// Ports without a direction line (in-process pipes, USB adapters with automatic
/// direction control) keep the default no-op.
pub trait HalfDuplexPort: AsyncRead + AsyncWrite + Unpin + Send {
    /// Drive the transceiver: `true` enables the line driver, `false` listens.
    fn set_transmit(&mut self, _enable: bool) -> io::Result<()> {
        Ok(())
    }
}

impl HalfDuplexPort for tokio::io::DuplexStream {}

#[cfg(feature = "rtu")]
impl HalfDuplexPort for tokio_serial::SerialStream {
    fn set_transmit(&mut self, enable: bool) -> io::Result<()> {
        use tokio_serial::SerialPort;
        // RTS is wired to DE/RE on the transceiver
        self.write_request_to_send(enable).map_err(io::Error::from)
    }
}

/// Transceiver direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkDirection {
    /// Driver enabled, the terminal owns the pair
    Transmit,
    /// Driver released, listening for the slave
    #[default]
    Receive,
}

/// Transport statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub timeouts: u64,
    pub stale_bytes_discarded: u64,
}

// ============================================================================
// Transport trait
// ============================================================================

/// Frame-level access to the meter link.
///
/// Implemented by [`RtuLink`]; the register client only depends on this trait so it
/// can run against scripted transports.
pub trait MeterTransport: Send {
    /// Transmit one complete frame, leaving the link in receive mode.
    fn send(&mut self, frame: &[u8]) -> impl std::future::Future<Output = ProtocolResult<()>> + Send;

    /// Fill `buf` completely or fail with [`ProtocolError::Timeout`].
    fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> impl std::future::Future<Output = ProtocolResult<()>> + Send;

    /// Get transport statistics
    fn stats(&self) -> TransportStats;
}

// ============================================================================
// RTU link
// ============================================================================

/// Half-duplex RTU link over a [`HalfDuplexPort`].
pub struct RtuLink<P: HalfDuplexPort> {
    port: P,
    direction: LinkDirection,
    stats: TransportStats,
    /// Used to wait out the frame's wire time after a flush
    baud_rate: Option<u32>,
    packet_logging: bool,
}

impl<P: HalfDuplexPort> RtuLink<P> {
    /// Wrap a port; the line starts in receive mode.
    pub fn new(port: P) -> Self {
        Self {
            port,
            direction: LinkDirection::Receive,
            stats: TransportStats::default(),
            baud_rate: None,
            packet_logging: false,
        }
    }

    /// Wait for the frame's wire time after each flush.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate).filter(|b| *b > 0);
        self
    }

    /// Log every frame as hex at `debug` level.
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// Current transceiver direction
    pub fn direction(&self) -> LinkDirection {
        self.direction
    }

    /// Switch the transceiver; a no-op when already in `direction`.
    pub fn switch_to(&mut self, direction: LinkDirection) -> io::Result<()> {
        if self.direction == direction {
            return Ok(());
        }
        self.port.set_transmit(direction == LinkDirection::Transmit)?;
        trace!("Link direction {:?} -> {:?}", self.direction, direction);
        self.direction = direction;
        Ok(())
    }

    /// Transmission time of `len` bytes at the configured baud rate
    fn wire_time(&self, len: usize) -> Option<Duration> {
        self.baud_rate.map(|baud| {
            let char_time_us = BITS_PER_CHAR * 1_000_000 / baud as u64;
            Duration::from_micros(char_time_us * len as u64)
        })
    }

    /// Discard whatever is already sitting in the receive buffer.
    async fn drain_stale(&mut self) -> ProtocolResult<()> {
        let mut scratch = [0u8; DRAIN_CHUNK];
        let mut discarded = 0usize;

        loop {
            match timeout(Duration::ZERO, self.port.read(&mut scratch)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        if discarded > 0 {
            debug!("Discarded {} stale bytes before request", discarded);
            self.stats.stale_bytes_discarded += discarded as u64;
        }
        Ok(())
    }

    async fn transmit(&mut self, frame: &[u8]) -> io::Result<()> {
        self.port.write_all(frame).await?;
        self.port.flush().await?;
        if let Some(wait) = self.wire_time(frame.len()) {
            sleep(wait).await;
        }
        Ok(())
    }
}

impl<P: HalfDuplexPort> MeterTransport for RtuLink<P> {
    async fn send(&mut self, frame: &[u8]) -> ProtocolResult<()> {
        self.drain_stale().await?;

        if self.packet_logging {
            debug!("TX [{}]", format_hex(frame));
        }

        self.switch_to(LinkDirection::Transmit)?;
        let written = self.transmit(frame).await;
        // Release the line even when the write failed
        let released = self.switch_to(LinkDirection::Receive);

        if let Err(e) = written {
            warn!("Frame write failed: {}", e);
            return Err(e.into());
        }
        released?;

        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], deadline_after: Duration) -> ProtocolResult<()> {
        let deadline = Instant::now() + deadline_after;
        let mut filled = 0usize;

        while filled < buf.len() {
            if Instant::now() >= deadline {
                self.stats.timeouts += 1;
                self.stats.bytes_received += filled as u64;
                return Err(ProtocolError::timeout(
                    "receive",
                    buf.len(),
                    filled,
                    deadline_after.as_millis() as u64,
                ));
            }

            match timeout(Duration::ZERO, self.port.read(&mut buf[filled..])).await {
                Ok(Ok(0)) | Err(_) => sleep(RECEIVE_POLL_INTERVAL).await,
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        if self.packet_logging {
            debug!("RX [{}]", format_hex(buf));
        }
        self.stats.frames_received += 1;
        self.stats.bytes_received += filled as u64;
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

#[cfg(feature = "rtu")]
impl RtuLink<tokio_serial::SerialStream> {
    /// Open a serial port 8N1 and wrap it, line released.
    pub fn open_serial(path: &str, baud_rate: u32) -> ProtocolResult<Self> {
        use tokio_serial::SerialPortBuilderExt;

        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| ProtocolError::io(format!("Failed to open {}: {}", path, e)))?;

        let mut link = Self::new(port).with_baud_rate(baud_rate);
        // Force the line low regardless of the driver's initial RTS state
        link.port.set_transmit(false)?;
        debug!("Opened serial port {} at {} baud", path, baud_rate);
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use tokio::io::{duplex, ReadBuf};
    use tokio_test::{assert_err, assert_ok};

    /// Shared view into a [`ScriptedPort`]
    #[derive(Default)]
    struct PortLog {
        /// Bytes waiting to be read
        rx: VecDeque<u8>,
        /// Everything written
        tx: Vec<u8>,
        /// Every set_transmit call
        transmit_calls: Vec<bool>,
        /// Transmit line state during each write
        transmit_during_write: Vec<bool>,
        fail_writes: bool,
        transmit: bool,
    }

    struct ScriptedPort {
        log: Arc<Mutex<PortLog>>,
    }

    impl ScriptedPort {
        fn new() -> (Self, Arc<Mutex<PortLog>>) {
            let log = Arc::new(Mutex::new(PortLog::default()));
            (Self { log: log.clone() }, log)
        }
    }

    impl AsyncRead for ScriptedPort {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let mut log = self.log.lock().unwrap();
            if log.rx.is_empty() {
                return Poll::Pending;
            }
            while buf.remaining() > 0 {
                match log.rx.pop_front() {
                    Some(b) => buf.put_slice(&[b]),
                    None => break,
                }
            }
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for ScriptedPort {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            data: &[u8],
        ) -> Poll<io::Result<usize>> {
            let mut log = self.log.lock().unwrap();
            let transmit = log.transmit;
            log.transmit_during_write.push(transmit);
            if log.fail_writes {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "line fault")));
            }
            log.tx.extend_from_slice(data);
            Poll::Ready(Ok(data.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl HalfDuplexPort for ScriptedPort {
        fn set_transmit(&mut self, enable: bool) -> io::Result<()> {
            let mut log = self.log.lock().unwrap();
            log.transmit_calls.push(enable);
            log.transmit = enable;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_toggles_direction_around_write() {
        let (port, log) = ScriptedPort::new();
        let mut link = RtuLink::new(port);

        assert_ok!(link.send(&[0x01, 0x06, 0x00, 0x00, 0x00, 0x01, 0x48, 0x0A]).await);

        let log = log.lock().unwrap();
        assert_eq!(log.transmit_calls, vec![true, false]);
        assert!(log.transmit_during_write.iter().all(|t| *t));
        assert_eq!(log.tx.len(), 8);
        assert_eq!(link.direction(), LinkDirection::Receive);
        assert_eq!(link.stats().frames_sent, 1);
        assert_eq!(link.stats().bytes_sent, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direction_released_after_write_error() {
        let (port, log) = ScriptedPort::new();
        log.lock().unwrap().fail_writes = true;
        let mut link = RtuLink::new(port);

        let err = assert_err!(link.send(&[0x01, 0x03]).await);
        assert!(matches!(err, ProtocolError::Io { .. }));
        assert_eq!(link.direction(), LinkDirection::Receive);
        assert_eq!(log.lock().unwrap().transmit_calls, vec![true, false]);
        assert_eq!(link.stats().frames_sent, 0);
    }

    #[test]
    fn test_switch_to_is_idempotent() {
        let (port, log) = ScriptedPort::new();
        let mut link = RtuLink::new(port);

        link.switch_to(LinkDirection::Receive).unwrap();
        assert!(log.lock().unwrap().transmit_calls.is_empty());

        link.switch_to(LinkDirection::Transmit).unwrap();
        link.switch_to(LinkDirection::Transmit).unwrap();
        assert_eq!(log.lock().unwrap().transmit_calls, vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_bytes_discarded_before_request() {
        let (port, log) = ScriptedPort::new();
        log.lock().unwrap().rx.extend([0xAA, 0xBB, 0xCC]);
        let mut link = RtuLink::new(port);

        assert_ok!(link.send(&[0x01, 0x03, 0x00, 0x01, 0x00, 0x06, 0x94, 0x08]).await);
        assert_eq!(link.stats().stale_bytes_discarded, 3);

        // Nothing left for the response read
        let mut buf = [0u8; 1];
        let err = assert_err!(link.receive(&mut buf, Duration::from_millis(10)).await);
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_timeout_reports_partial_count() {
        let (port, log) = ScriptedPort::new();
        log.lock().unwrap().rx.extend([0x01, 0x03, 0x0C]);
        let mut link = RtuLink::new(port);

        let mut buf = [0u8; 8];
        let started = Instant::now();
        let err = assert_err!(link.receive(&mut buf, Duration::from_millis(100)).await);

        assert_eq!(err, ProtocolError::timeout("receive", 8, 3, 100));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(link.stats().timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_over_duplex_pipe() {
        let (local, mut remote) = duplex(64);
        let mut link = RtuLink::new(local).with_packet_logging(true);

        let reply = tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            remote.write_all(&[0x01, 0x06, 0x00]).await.unwrap();
            sleep(Duration::from_millis(20)).await;
            remote.write_all(&[0x00, 0x00, 0x01, 0x48, 0x0A]).await.unwrap();
            remote
        });

        let mut buf = [0u8; 8];
        assert_ok!(link.receive(&mut buf, Duration::from_millis(100)).await);
        assert_eq!(buf, [0x01, 0x06, 0x00, 0x00, 0x00, 0x01, 0x48, 0x0A]);
        assert_eq!(link.stats().frames_received, 1);
        drop(reply.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wire_time_wait_after_flush() {
        let (local, _remote) = duplex(64);
        let mut link = RtuLink::new(local).with_baud_rate(19_200);

        // 11 bits * 8 bytes at 19200 baud: 572 us per char rounded down -> 4576 us
        assert_eq!(link.wire_time(8), Some(Duration::from_micros(4_576)));

        let started = Instant::now();
        assert_ok!(link.send(&[0u8; 8]).await);
        assert!(started.elapsed() >= Duration::from_micros(4_576));
    }
}
