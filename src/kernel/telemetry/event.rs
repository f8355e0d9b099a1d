use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    LoopStarted { generation: u64 },
    LoopExited { generation: u64, exit: LoopExit },

    /// Speech source returned nothing usable.
    SilenceSkipped,

    ReadingStored,

    IterationFault { stage: FaultStage },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopExit {
    Cancelled,
    /// Liveness flag was cleared between iterations.
    FlagCleared,
    /// Task dropped without a panic, e.g. runtime shutdown.
    Aborted,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultStage {
    Listen,
    Classify,
}
