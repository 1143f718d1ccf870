//! Fueling session state machine
//!
//! The meter raises no interrupts, so the controller polls it at a fixed cadence and
//! compares each sample of the session-active bit with the previous one. A falling
//! edge (set, then clear) closes the session.
//!
//! ```text
//!            card ok, write ok             poll: active bit 1 -> 0
//!   Idle ───────────────────> Active ─────────────────────────────> Closing
//!    ^  (Starting while the                                           │
//!    │   start command is out)                                        │
//!    └──────────────────── summary display elapsed ───────────────────┘
//! ```
//!
//! Presentation is decoupled through an unbounded channel of [`SessionEvent`]s.

use std::time::Duration;

use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::auth::AuthorizationGate;
use crate::bus::{BusArbiter, BusOwner, BusSelect};
use crate::client::RegisterAccess;
use crate::config::TerminalConfig;
use crate::constants::{
    CMD_START_SESSION, METER_POLL_REGISTER_COUNT, REG_CONTROL_CMD, REG_STATUS_FLAGS,
};
use crate::error::{ProtocolError, ProtocolResult};
use crate::meter::MeterReading;

/// A warning is logged every time this many polls in a row have failed.
pub const STALL_WARN_THRESHOLD: u32 = 10;

/// Period of the cooperative control loop in [`SessionController::run`]
pub const LOOP_PERIOD: Duration = Duration::from_millis(10);

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Start command sent, echo pending
    Starting,
    Active,
    /// Summary on screen
    Closing,
}

/// Current fueling session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub active: bool,
    pub driver_id: String,
    pub driver_plate: String,
    pub last_volume_liters: f64,
}

/// Events for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Started { driver_id: String, plate: String },
    Updated(MeterReading),
    Closed { final_liters: f64 },
    ReturnedToIdle,
    Rejected { card_id: String },
    StartFailed { reason: ProtocolError },
    /// Administrator card read; the settings menu takes over
    AdminCard { card_id: String },
}

/// Result of presenting a card
#[derive(Debug, Clone, PartialEq)]
pub enum CardOutcome {
    Started,
    Rejected,
    StartFailed(ProtocolError),
    /// A session is already starting or running
    Ignored,
    /// Administrator card, never starts a session
    Admin,
}

/// Owns the session, the last reading and the register client.
pub struct SessionController<C: RegisterAccess, G: AuthorizationGate> {
    client: C,
    gate: G,
    events: UnboundedSender<SessionEvent>,

    slave_address: u8,
    admin_card: Option<String>,
    poll_interval: Duration,
    summary_display: Duration,

    phase: SessionPhase,
    session: Session,
    last_reading: Option<MeterReading>,
    previous_active: bool,
    seen_active: bool,
    inactive_warned: bool,
    last_poll: Option<Instant>,
    summary_started: Option<Instant>,
    consecutive_poll_failures: u32,
}

impl<C: RegisterAccess, G: AuthorizationGate> SessionController<C, G> {
    /// Create an idle controller.
    ///
    /// Events go to `events`; a dropped receiver only discards them.
    pub fn new(
        client: C,
        gate: G,
        config: &TerminalConfig,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            client,
            gate,
            events,
            slave_address: config.slave_address,
            admin_card: config
                .admin_card
                .as_deref()
                .map(|uid| uid.trim().to_ascii_uppercase()),
            poll_interval: config.poll_interval(),
            summary_display: config.summary_display(),
            phase: SessionPhase::Idle,
            session: Session::default(),
            last_reading: None,
            previous_active: false,
            seen_active: false,
            inactive_warned: false,
            last_poll: None,
            summary_started: None,
            consecutive_poll_failures: 0,
        }
    }

    /// Current state
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Current session; empty while idle
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Last successful meter poll of the current session
    pub fn last_reading(&self) -> Option<&MeterReading> {
        self.last_reading.as_ref()
    }

    /// Polls failed in a row; reset by the next good reading
    pub fn consecutive_poll_failures(&self) -> u32 {
        self.consecutive_poll_failures
    }

    /// Get reference to the register client
    pub fn client(&self) -> &C {
        &self.client
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Presentation receiver dropped, event discarded");
        }
    }

    /// Handle a card read by the reader.
    ///
    /// The administrator card is recognised in every phase. Driver cards are
    /// accepted while idle or while the previous session's summary is shown; a
    /// rejected card or a failed start during the summary ends it.
    pub async fn present_card(&mut self, card_id: &str, now: Instant) -> CardOutcome {
        let card_id = card_id.trim().to_ascii_uppercase();

        if self.admin_card.as_deref() == Some(card_id.as_str()) {
            info!("Administrator card {}", card_id);
            self.emit(SessionEvent::AdminCard { card_id });
            return CardOutcome::Admin;
        }

        let resume_phase = match self.phase {
            SessionPhase::Starting | SessionPhase::Active => {
                debug!("Card {} ignored during {:?}", card_id, self.phase);
                return CardOutcome::Ignored;
            }
            phase => phase,
        };

        let Some(plate) = self.gate.lookup_card(&card_id) else {
            info!("Unauthorized card {}", card_id);
            self.emit(SessionEvent::Rejected { card_id });
            if resume_phase == SessionPhase::Closing {
                self.return_to_idle();
            }
            return CardOutcome::Rejected;
        };

        self.phase = SessionPhase::Starting;
        debug!("Card {} authorized for {}, starting session", card_id, plate);

        if let Err(e) = self
            .client
            .write_single_register(self.slave_address, REG_CONTROL_CMD, CMD_START_SESSION)
            .await
        {
            warn!("Start command failed: {}", e);
            self.phase = SessionPhase::Idle;
            self.emit(SessionEvent::StartFailed { reason: e.clone() });
            if resume_phase == SessionPhase::Closing {
                self.return_to_idle();
            }
            return CardOutcome::StartFailed(e);
        }

        self.session = Session {
            active: true,
            driver_id: card_id.clone(),
            driver_plate: plate.clone(),
            last_volume_liters: 0.0,
        };
        self.last_reading = None;
        self.previous_active = false;
        self.seen_active = false;
        self.inactive_warned = false;
        self.summary_started = None;
        self.consecutive_poll_failures = 0;
        self.phase = SessionPhase::Active;

        info!("Session started: driver {} plate {}", card_id, plate);
        self.emit(SessionEvent::Started {
            driver_id: card_id,
            plate,
        });

        // Seed sample; the next poll is due one interval later
        self.poll(now).await;
        self.last_poll = Some(now);

        CardOutcome::Started
    }

    /// Advance timers; issues at most one exchange.
    pub async fn tick(&mut self, now: Instant) {
        match self.phase {
            SessionPhase::Active => {
                let due = self
                    .last_poll
                    .map_or(true, |last| now.duration_since(last) >= self.poll_interval);
                if due {
                    self.last_poll = Some(now);
                    self.poll(now).await;
                }
            }
            SessionPhase::Closing => {
                let elapsed = self
                    .summary_started
                    .map_or(true, |started| now.duration_since(started) >= self.summary_display);
                if elapsed {
                    self.return_to_idle();
                }
            }
            SessionPhase::Idle | SessionPhase::Starting => {}
        }
    }

    async fn read_meter(&mut self) -> ProtocolResult<MeterReading> {
        let registers = self
            .client
            .read_holding_registers(self.slave_address, REG_STATUS_FLAGS, METER_POLL_REGISTER_COUNT)
            .await?;
        MeterReading::from_registers(&registers)
    }

    async fn poll(&mut self, now: Instant) {
        let reading = match self.read_meter().await {
            Ok(reading) => reading,
            Err(e) => {
                self.consecutive_poll_failures += 1;
                warn!("Meter poll failed: {}", e);
                if self.consecutive_poll_failures % STALL_WARN_THRESHOLD == 0 {
                    warn!(
                        "No meter reading for {} consecutive polls",
                        self.consecutive_poll_failures
                    );
                }
                return;
            }
        };

        self.consecutive_poll_failures = 0;
        let active = reading.status.is_session_active();
        self.session.last_volume_liters = reading.session_volume_liters();
        self.last_reading = Some(reading);
        self.emit(SessionEvent::Updated(reading));

        if self.previous_active && !active {
            self.close(now);
            return;
        }

        if active {
            self.seen_active = true;
        } else if !self.seen_active && !self.inactive_warned {
            warn!("Meter has not reported an active session yet");
            self.inactive_warned = true;
        }
        self.previous_active = active;
    }

    fn close(&mut self, now: Instant) {
        let final_liters = self.session.last_volume_liters;
        self.session.active = false;
        self.previous_active = false;
        self.summary_started = Some(now);
        self.phase = SessionPhase::Closing;

        info!(
            "Session closed: plate {} dispensed {:.2} L",
            self.session.driver_plate, final_liters
        );
        self.emit(SessionEvent::Closed { final_liters });
    }

    fn return_to_idle(&mut self) {
        self.session = Session::default();
        self.summary_started = None;
        self.last_poll = None;
        self.phase = SessionPhase::Idle;
        debug!("Summary ended, back to idle");
        self.emit(SessionEvent::ReturnedToIdle);
    }

    /// Control loop: check for a card, then tick, every [`LOOP_PERIOD`].
    ///
    /// Once the card channel is closed and drained, a running session is followed
    /// to its end; the loop returns when the controller is back to idle. The meter
    /// owns the bus whenever the loop is not reading a card.
    pub async fn run<S: BusSelect>(
        &mut self,
        mut cards: UnboundedReceiver<String>,
        bus: &mut BusArbiter<S>,
    ) {
        let mut period = interval(LOOP_PERIOD);
        period.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cards_open = true;

        loop {
            period.tick().await;

            let mut card = None;
            if cards_open {
                bus.switch_to(BusOwner::CardReader);
                match cards.try_recv() {
                    Ok(id) => card = Some(id),
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => {
                        cards_open = false;
                        info!("Card source closed");
                    }
                }
                bus.switch_to(BusOwner::Meter);
            }

            match card {
                Some(card_id) => {
                    self.present_card(&card_id, Instant::now()).await;
                }
                None if !cards_open && self.phase == SessionPhase::Idle => break,
                None => self.tick(Instant::now()).await,
            }
        }

        info!("Control loop stopped");
    }
}
