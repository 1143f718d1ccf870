#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use fuel_terminal::tokio::runtime::Builder;
use fuel_terminal::{
    MeterTransport, ProtocolError, ProtocolResult, RegisterAccess, RegisterClient, TransportStats,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    count: u8,
    write: bool,
    reply: Vec<u8>,
}

/// Serves the fuzzer's bytes as the meter's reply.
struct ReplayTransport {
    reply: Vec<u8>,
    pos: usize,
}

impl MeterTransport for ReplayTransport {
    async fn send(&mut self, _frame: &[u8]) -> ProtocolResult<()> {
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> ProtocolResult<()> {
        let available = self.reply.len() - self.pos;
        if available < buf.len() {
            self.pos = self.reply.len();
            return Err(ProtocolError::timeout(
                "receive",
                buf.len(),
                available,
                timeout.as_millis() as u64,
            ));
        }
        buf.copy_from_slice(&self.reply[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

fuzz_target!(|input: Input| {
    let runtime = match Builder::new_current_thread().build() {
        Ok(rt) => rt,
        Err(_) => return,
    };
    let mut client = RegisterClient::new(ReplayTransport {
        reply: input.reply,
        pos: 0,
    });

    runtime.block_on(async {
        if input.write {
            let _ = client.write_single_register(1, 0, 1).await;
        } else if let Ok(registers) = client.read_holding_registers(1, 1, input.count as u16).await {
            assert_eq!(registers.len(), input.count as usize);
        }
    });
});
