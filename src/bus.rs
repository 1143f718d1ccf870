//! Shared peripheral bus arbitration
//!
//! The card reader and the meter transceiver share one bus; only one of them may
//! be selected at a time.

use tracing::trace;

/// Current owner of the shared bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusOwner {
    #[default]
    Meter,
    CardReader,
}

/// Hardware hook that selects a bus owner (chip selects, mux lines).
pub trait BusSelect {
    fn select(&mut self, owner: BusOwner);
}

/// Selector for boards where the peripherals do not share a bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBusSelect;

impl BusSelect for NoopBusSelect {
    fn select(&mut self, _owner: BusOwner) {}
}

/// Tracks the bus owner and switches only on change.
pub struct BusArbiter<S: BusSelect> {
    owner: BusOwner,
    select: S,
}

impl<S: BusSelect> BusArbiter<S> {
    /// Select the meter and start tracking.
    pub fn new(mut select: S) -> Self {
        select.select(BusOwner::Meter);
        Self {
            owner: BusOwner::Meter,
            select,
        }
    }

    /// Device currently selected
    pub fn owner(&self) -> BusOwner {
        self.owner
    }

    /// Switch to `owner`; returns whether the selection changed.
    pub fn switch_to(&mut self, owner: BusOwner) -> bool {
        if self.owner == owner {
            return false;
        }
        trace!("Bus {:?} -> {:?}", self.owner, owner);
        self.select.select(owner);
        self.owner = owner;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSelect(Vec<BusOwner>);

    impl BusSelect for RecordingSelect {
        fn select(&mut self, owner: BusOwner) {
            self.0.push(owner);
        }
    }

    #[test]
    fn test_switch_is_idempotent() {
        let mut bus = BusArbiter::new(RecordingSelect::default());
        assert_eq!(bus.owner(), BusOwner::Meter);

        assert!(!bus.switch_to(BusOwner::Meter));
        assert!(bus.switch_to(BusOwner::CardReader));
        assert!(!bus.switch_to(BusOwner::CardReader));
        assert!(bus.switch_to(BusOwner::Meter));

        assert_eq!(
            bus.select.0,
            vec![BusOwner::Meter, BusOwner::CardReader, BusOwner::Meter]
        );
    }
}
