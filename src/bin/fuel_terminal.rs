//! Fuel terminal
//!
//! Drives a flow meter over a serial port. Card ids are read from standard input,
//! one per line, standing in for the card reader; session events are logged.
//! The terminal keeps running after standard input ends and stops on Ctrl-C, once
//! any running session has closed.
//!
//! Usage: fuel-terminal [config.toml]
//! Example: RUST_LOG=debug fuel-terminal /etc/fuel-terminal.toml

use fuel_terminal::{
    init_logging, BusArbiter, CardTable, NoopBusSelect, RegisterClient, RtuLink,
    SessionController, SessionEvent, TerminalConfig, VERSION,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "terminal.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info")?;
    info!("fuel-terminal v{}", VERSION);

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = TerminalConfig::load(&path).map_err(|e| {
        error!("{}", e);
        e
    })?;

    let link = RtuLink::open_serial(&config.serial.port, config.serial.baud_rate)?
        .with_packet_logging(config.packet_logging);
    let client = RegisterClient::new(link)
        .with_write_timeout(config.write_timeout())
        .with_read_timeout(config.read_timeout());
    let cards = CardTable::from_cards(config.drivers.iter().cloned())?;
    if cards.is_empty() {
        warn!("No driver cards configured, every card will be rejected");
    }

    info!(
        "Meter at slave {} on {} ({} baud), {} driver cards",
        config.slave_address,
        config.serial.port,
        config.serial.baud_rate,
        cards.len()
    );

    let (events_tx, events_rx) = unbounded_channel();
    let (cards_tx, cards_rx) = unbounded_channel();
    tokio::spawn(read_cards(cards_tx));
    let printer = tokio::spawn(show_events(events_rx));

    let mut controller = SessionController::new(client, cards, &config, events_tx);
    let mut bus = BusArbiter::new(NoopBusSelect);
    controller.run(cards_rx, &mut bus).await;

    let stats = controller.client().stats();
    info!(
        "Link stats: {} frames sent, {} received, {} timeouts, {} stale bytes discarded",
        stats.frames_sent, stats.frames_received, stats.timeouts, stats.stale_bytes_discarded
    );

    drop(controller);
    printer.await?;
    Ok(())
}

/// Forward stdin lines as card ids until Ctrl-C. Dropping `cards` stops the
/// controller.
async fn read_cards(cards: UnboundedSender<String>) {
    tokio::select! {
        _ = forward_stdin(&cards) => {
            info!("No more card input, press Ctrl-C to stop");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Ctrl-C handler: {}", e);
            }
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Ctrl-C handler: {}", e);
            }
        }
    }
    info!("Stopping after the current session");
}

async fn forward_stdin(cards: &UnboundedSender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let card_id = line.trim();
                if card_id.is_empty() {
                    continue;
                }
                if cards.send(card_id.to_string()).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("stdin: {}", e);
                break;
            }
        }
    }
}

async fn show_events(mut events: UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Started { driver_id, plate } => {
                info!("Card {} / plate {}: start fueling", driver_id, plate);
            }
            SessionEvent::Updated(reading) => {
                info!(
                    "Dispensed {:.2} L, flow {:.2} L/min, total {:.2} L",
                    reading.session_volume_liters(),
                    reading.flow_rate_liters_per_min(),
                    reading.total_volume_liters()
                );
            }
            SessionEvent::Closed { final_liters } => {
                info!("Fueling complete: {:.2} L", final_liters);
            }
            SessionEvent::ReturnedToIdle => info!("Present card"),
            SessionEvent::Rejected { card_id } => warn!("Card {} is not authorized", card_id),
            SessionEvent::StartFailed { reason } => warn!("Meter did not start: {}", reason),
            SessionEvent::AdminCard { card_id } => {
                info!("Administrator card {} read, settings menu", card_id);
            }
        }
    }
}
