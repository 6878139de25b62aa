// NV7 Controller — Simulated Hardware
//
// Stand-ins for the ladder ADC and indicator LED so the whole pipeline can
// run on a development host and under test.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::READING_SCALE;
use crate::drivers::adc::AnalogSource;
use crate::drivers::indicator::ChannelIndicator;
use crate::events::Channel;

/// Open ladder (no button down) reads at the top of the range.
pub const LADDER_IDLE: i32 = READING_SCALE;

#[derive(Debug)]
struct LadderShared {
    level: AtomicI32,
    pending_faults: AtomicU32,
    dead: AtomicBool,
}

/// Analog source whose raw scale equals the normalised scale, so a raw level
/// of `n` averages to a reading of `n`.
pub struct SimulatedLadder {
    shared: Arc<LadderShared>,
}

/// Remote control for a [`SimulatedLadder`] owned by the sampler thread.
#[derive(Clone)]
pub struct LadderHandle {
    shared: Arc<LadderShared>,
}

impl SimulatedLadder {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(LadderShared {
                level: AtomicI32::new(LADDER_IDLE),
                pending_faults: AtomicU32::new(0),
                dead: AtomicBool::new(false),
            }),
        }
    }

    pub fn handle(&self) -> LadderHandle {
        LadderHandle { shared: Arc::clone(&self.shared) }
    }
}

impl Default for SimulatedLadder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalogSource for SimulatedLadder {
    fn read_raw(&mut self) -> anyhow::Result<i32> {
        if self.shared.dead.load(Ordering::SeqCst) {
            anyhow::bail!("simulated ADC not responding");
        }
        let faulted = self
            .shared
            .pending_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if faulted {
            anyhow::bail!("simulated transient read error");
        }
        Ok(self.shared.level.load(Ordering::SeqCst))
    }

    fn full_scale(&self) -> i32 {
        READING_SCALE
    }
}

impl LadderHandle {
    /// Drive the ladder to `level` (e.g. a button's configured centre).
    pub fn set_level(&self, level: i32) {
        self.shared.level.store(level, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.set_level(LADDER_IDLE);
    }

    /// The next `count` reads fail, then reads recover.
    pub fn inject_faults(&self, count: u32) {
        self.shared.pending_faults.store(count, Ordering::SeqCst);
    }

    /// Every read from now on fails.
    pub fn kill(&self) {
        self.shared.dead.store(true, Ordering::SeqCst);
    }
}

/// Indicator that just remembers the level it was last driven to.
#[derive(Clone, Default)]
pub struct SimulatedIndicator {
    high: Arc<AtomicBool>,
    writes: Arc<AtomicU32>,
}

impl SimulatedIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ChannelIndicator for SimulatedIndicator {
    fn show(&mut self, channel: Channel) -> anyhow::Result<()> {
        self.high.store(channel == Channel::B, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
