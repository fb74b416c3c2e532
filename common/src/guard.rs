use log::info;
use thiserror::Error;

pub const ONE_YEAR_SECS: i64 = 365 * 24 * 60 * 60;
pub const ONE_MONTH_SECS: i64 = ONE_YEAR_SECS / 12;

/// Backing storage for the reference epoch. The target implementation
/// lives in RTC slow memory: it survives a software restart but reads as
/// unset after a full power cycle.
pub trait AnchorStore {
    fn load(&self) -> Option<i64>;
    fn store(&mut self, epoch: i64);
}

/// Process-local anchor used by the host run mode and tests.
#[derive(Debug, Default)]
pub struct MemoryAnchor {
    epoch: Option<i64>,
}

impl MemoryAnchor {
    pub fn new(epoch: Option<i64>) -> Self {
        Self { epoch }
    }
}

impl AnchorStore for MemoryAnchor {
    fn load(&self) -> Option<i64> {
        self.epoch
    }

    fn store(&mut self, epoch: i64) {
        self.epoch = Some(epoch);
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("epoch {candidate} is {drift}s away from reference {reference} (tolerance {tolerance}s)")]
pub struct DriftExceeded {
    pub candidate: i64,
    pub reference: i64,
    pub drift: i64,
    pub tolerance: i64,
}

/// Validates freshly obtained epochs against a trusted reference.
///
/// The tolerance starts at one year on every boot so that a stale
/// compile-time fallback anchor is still accepted. After the first
/// accepted validation the reference is pinned to that epoch and the
/// tolerance narrows to one month for the rest of the run; an untrusted
/// time source then gets at most a month of skew before the caller is
/// forced to restart. The reference is deliberately never re-anchored
/// within a run.
pub struct TimeIntegrityGuard<A: AnchorStore> {
    anchor: A,
    reference_epoch: i64,
    tolerance_secs: i64,
    anchored: bool,
}

impl<A: AnchorStore> TimeIntegrityGuard<A> {
    /// Build the guard from the persisted anchor, falling back to the
    /// compile-time epoch when no value survived (cold boot).
    pub fn new(anchor: A, fallback_epoch: i64) -> Self {
        let reference_epoch = match anchor.load() {
            Some(persisted) => {
                info!("retrieved reference epoch: {persisted}");
                persisted
            }
            None => {
                info!("initialized reference epoch from build fallback: {fallback_epoch}");
                fallback_epoch
            }
        };

        Self {
            anchor,
            reference_epoch,
            tolerance_secs: ONE_YEAR_SECS,
            anchored: false,
        }
    }

    pub fn reference_epoch(&self) -> i64 {
        self.reference_epoch
    }

    pub fn tolerance_secs(&self) -> i64 {
        self.tolerance_secs
    }

    /// Check `candidate` against the reference. Within tolerance, the first
    /// acceptance of this run pins the reference to `candidate`, persists
    /// it, and narrows the tolerance; later acceptances change nothing.
    pub fn validate(&mut self, candidate: i64) -> Result<i64, DriftExceeded> {
        let drift = (candidate - self.reference_epoch).abs();
        if drift >= self.tolerance_secs {
            return Err(DriftExceeded {
                candidate,
                reference: self.reference_epoch,
                drift,
                tolerance: self.tolerance_secs,
            });
        }

        if !self.anchored {
            self.reference_epoch = candidate;
            self.anchor.store(candidate);
            self.tolerance_secs = ONE_MONTH_SECS;
            self.anchored = true;
            info!("time anchor established at {candidate}, tolerance narrowed to one month");
        }

        Ok(self.reference_epoch)
    }
}
