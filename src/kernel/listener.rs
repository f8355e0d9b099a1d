use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::services::{ClassifierResponse, SentimentClassifier, SpeechSource};

use super::reading::UNKNOWN_SENTIMENT;
use super::state::ListenState;
use super::telemetry::event::{FaultStage, LoopExit, TelemetryEvent};

/// Pause after a failed iteration before listening again.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// The two external capabilities a loop run is bound to.
#[derive(Clone)]
pub struct Pipeline {
    pub speech: Arc<dyn SpeechSource>,
    pub classifier: Arc<dyn SentimentClassifier>,
}

impl Pipeline {
    pub fn new(speech: Arc<dyn SpeechSource>, classifier: Arc<dyn SentimentClassifier>) -> Self {
        Self { speech, classifier }
    }
}

#[derive(Debug)]
pub struct IterationFault {
    pub stage: FaultStage,
    pub source: anyhow::Error,
}

/// One run of the listen → classify → cache pipeline.
pub struct ListenLoop {
    pipeline: Pipeline,
    state: Arc<ListenState>,
    cancel: CancellationToken,
    generation: u64,
    backoff: Duration,
}

impl ListenLoop {
    pub fn new(
        pipeline: Pipeline,
        state: Arc<ListenState>,
        cancel: CancellationToken,
        generation: u64,
        backoff: Duration,
    ) -> Self {
        Self {
            pipeline,
            state,
            cancel,
            generation,
            backoff,
        }
    }

    /// Runs until cancelled or until the liveness flag stops naming this run.
    /// Iteration faults are absorbed here; anything that unwinds past them is
    /// reported by the exit guard, which also clears the liveness flag.
    pub async fn run(self) {
        let mut guard = ExitGuard {
            state: Arc::clone(&self.state),
            generation: self.generation,
            exit: LoopExit::Fatal,
        };

        self.state
            .telemetry
            .record(TelemetryEvent::LoopStarted { generation: self.generation });
        info!(generation = self.generation, "Listen loop started");

        loop {
            if self.cancel.is_cancelled() {
                guard.exit = LoopExit::Cancelled;
                break;
            }
            if !self.state.should_continue(self.generation) {
                guard.exit = LoopExit::FlagCleared;
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    guard.exit = LoopExit::Cancelled;
                    break;
                }
                outcome = self.iterate() => outcome,
            };

            if let Err(fault) = outcome {
                warn!(stage = ?fault.stage, "Error in listening loop: {:#}", fault.source);
                self.state
                    .telemetry
                    .record(TelemetryEvent::IterationFault { stage: fault.stage });

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        guard.exit = LoopExit::Cancelled;
                        break;
                    }
                    _ = tokio::time::sleep(self.backoff) => {}
                }
            }
        }
    }

    /// A single pass. Cancellation can only land on the two awaits, so the
    /// cache write is either fully done or never started.
    async fn iterate(&self) -> Result<(), IterationFault> {
        let text = self
            .pipeline
            .speech
            .listen()
            .await
            .map_err(|source| IterationFault { stage: FaultStage::Listen, source })?;

        if text.trim().is_empty() {
            debug!("No speech heard");
            self.state.telemetry.record(TelemetryEvent::SilenceSkipped);
            return Ok(());
        }
        info!("Heard: {}", text);

        let response = self
            .pipeline
            .classifier
            .classify(&text)
            .await
            .map_err(|source| IterationFault { stage: FaultStage::Classify, source })?;

        let sentiment = extract_sentiment(&response);
        info!("Sentiment: {}", sentiment);

        self.state.cache.write(text, sentiment);
        self.state.telemetry.record(TelemetryEvent::ReadingStored);
        Ok(())
    }
}

/// Pulls the label out of a classifier response. A missing or null field is
/// not an error, it just means the classifier had no opinion.
pub fn extract_sentiment(response: &ClassifierResponse) -> String {
    match response.get("sentiment") {
        None | Some(Value::Null) => UNKNOWN_SENTIMENT.to_string(),
        Some(Value::String(label)) => label.clone(),
        Some(other) => other.to_string(),
    }
}

struct ExitGuard {
    state: Arc<ListenState>,
    generation: u64,
    exit: LoopExit,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.exit == LoopExit::Fatal && !std::thread::panicking() {
            self.exit = LoopExit::Aborted;
        }

        match self.exit {
            LoopExit::Cancelled => info!(generation = self.generation, "Listening loop cancelled"),
            LoopExit::FlagCleared => info!(generation = self.generation, "Listening loop stopped"),
            LoopExit::Aborted => warn!(generation = self.generation, "Listening loop dropped"),
            LoopExit::Fatal => error!(generation = self.generation, "Fatal error in listening loop"),
        }

        self.state.finish_run(self.generation);
        self.state.telemetry.record(TelemetryEvent::LoopExited {
            generation: self.generation,
            exit: self.exit,
        });
    }
}
