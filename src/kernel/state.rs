use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use super::reading::ReadingCache;
use super::telemetry::recorder::TelemetryRecorder;

/// Lifecycle of the listen loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LoopPhase {
    /// No loop has ever been spawned.
    #[default]
    NotStarted,
    Running,
    /// Stop requested, the task has not observed it yet.
    Stopping,
    /// Not necessarily terminal: a later start goes back to Running.
    Stopped,
}

/// Each spawned loop gets a fresh generation. A loop only keeps running, and
/// only marks itself stopped, while its generation is the current one.
#[derive(Debug, Default)]
struct Liveness {
    generation: u64,
    phase: LoopPhase,
}

/// State shared between the loop task and the read/command path.
#[derive(Debug)]
pub struct ListenState {
    pub cache: ReadingCache,
    pub telemetry: TelemetryRecorder,
    liveness: Mutex<Liveness>,
}

impl ListenState {
    pub fn new(cache: ReadingCache) -> Self {
        Self {
            cache,
            telemetry: TelemetryRecorder::new(),
            liveness: Mutex::new(Liveness::default()),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.lock().phase == LoopPhase::Running
    }

    pub fn phase(&self) -> LoopPhase {
        self.lock().phase
    }

    /// Flips into Running and hands back the new generation, or `None` if a
    /// loop is already running.
    pub(crate) fn begin_run(&self) -> Option<u64> {
        let mut live = self.lock();
        if live.phase == LoopPhase::Running {
            return None;
        }
        live.generation += 1;
        live.phase = LoopPhase::Running;
        Some(live.generation)
    }

    /// Clears the liveness flag. Returns true if a loop was running.
    pub(crate) fn request_stop(&self) -> bool {
        let mut live = self.lock();
        if live.phase == LoopPhase::Running {
            live.phase = LoopPhase::Stopping;
            true
        } else {
            false
        }
    }

    pub(crate) fn should_continue(&self, generation: u64) -> bool {
        let live = self.lock();
        live.generation == generation && live.phase == LoopPhase::Running
    }

    /// Called by the loop on its way out. A loop that has been superseded by a
    /// newer run leaves the flag alone.
    pub(crate) fn finish_run(&self, generation: u64) -> bool {
        let mut live = self.lock();
        if live.generation != generation {
            return false;
        }
        live.phase = LoopPhase::Stopped;
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Liveness> {
        self.liveness.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ListenState {
    fn default() -> Self {
        Self::new(ReadingCache::default())
    }
}
