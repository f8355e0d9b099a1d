use serde::Serialize;

use super::event::{FaultStage, LoopExit, TelemetryEvent};

/// Counters derived from the event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListenStats {
    pub loops_started: u64,
    pub loops_cancelled: u64,
    pub loops_fatal: u64,
    pub silences_skipped: u64,
    pub readings_stored: u64,
    pub listen_faults: u64,
    pub classify_faults: u64,
}

impl ListenStats {
    pub fn iteration_faults(&self) -> u64 {
        self.listen_faults + self.classify_faults
    }

    /// Iterations that reached a conclusion (stored, skipped or faulted).
    pub fn iterations(&self) -> u64 {
        self.readings_stored + self.silences_skipped + self.iteration_faults()
    }

    pub fn apply(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::LoopStarted { .. } => self.loops_started += 1,
            TelemetryEvent::LoopExited { exit, .. } => match exit {
                LoopExit::Cancelled => self.loops_cancelled += 1,
                LoopExit::Fatal => self.loops_fatal += 1,
                LoopExit::FlagCleared | LoopExit::Aborted => {}
            },
            TelemetryEvent::SilenceSkipped => self.silences_skipped += 1,
            TelemetryEvent::ReadingStored => self.readings_stored += 1,
            TelemetryEvent::IterationFault { stage } => match stage {
                FaultStage::Listen => self.listen_faults += 1,
                FaultStage::Classify => self.classify_faults += 1,
            },
        }
    }
}

pub fn compute_stats<'a>(events: impl IntoIterator<Item = &'a TelemetryEvent>) -> ListenStats {
    let mut stats = ListenStats::default();
    for event in events {
        stats.apply(event);
    }
    stats
}
