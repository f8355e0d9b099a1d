use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Result, SensorError};

use super::listener::{ListenLoop, Pipeline, DEFAULT_BACKOFF};
use super::reading::{ReadingCache, NO_SENTIMENT};
use super::state::{ListenState, LoopPhase};
use super::telemetry::metrics::ListenStats;

/// Tuning for loop runs spawned by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub backoff: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Point-in-time view used by `get_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListenStatus {
    pub is_listening: bool,
    pub has_reading: bool,
    pub expiration_window: Duration,
}

/// What readers get back. Always structurally complete, even with no reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestReading {
    pub text_heard: String,
    pub sentiment: String,
    pub time: DateTime<Utc>,
    pub is_listening: bool,
}

impl LatestReading {
    /// Wire shape: `time` as an ISO-8601 string.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("text_heard".to_string(), json!(self.text_heard));
        map.insert("sentiment".to_string(), json!(self.sentiment));
        map.insert("time".to_string(), json!(self.time.to_rfc3339()));
        map.insert("is_listening".to_string(), json!(self.is_listening));
        map
    }
}

struct ListenTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Start/stop/status surface over the listen loop.
///
/// Only one loop runs at a time: `start` is a no-op while listening, and
/// `rebind` waits for the current loop to exit before swapping services.
pub struct LifecycleController {
    state: Arc<ListenState>,
    pipeline: Mutex<Option<Pipeline>>,
    // Newest last. Older entries are runs that were stopped but may not
    // have exited yet.
    tasks: Mutex<Vec<ListenTask>>,
    settings: LoopSettings,
}

impl LifecycleController {
    pub fn new(cache: ReadingCache) -> Self {
        Self::with_settings(cache, LoopSettings::default())
    }

    pub fn with_settings(cache: ReadingCache, settings: LoopSettings) -> Self {
        Self {
            state: Arc::new(ListenState::new(cache)),
            pipeline: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            settings,
        }
    }

    pub fn state(&self) -> &Arc<ListenState> {
        &self.state
    }

    /// Binds services for future loop runs. Does not touch a running loop;
    /// use [`rebind`](Self::rebind) when one may be active.
    pub fn bind(&self, pipeline: Pipeline) {
        *lock(&self.pipeline) = Some(pipeline);
    }

    /// Stops and awaits any running loop, then binds the new services.
    ///
    /// The old services are unbound in the same critical section that stops
    /// the loop, so a `start` racing the await fails with `NotConfigured`
    /// instead of spawning a run on the old services.
    pub async fn rebind(&self, pipeline: Pipeline) -> Result<()> {
        {
            let mut bound = lock(&self.pipeline);
            *bound = None;
            self.stop();
        }
        let stopped = self.shutdown().await;
        self.bind(pipeline);
        stopped
    }

    pub fn set_expiration_window(&self, window: Duration) {
        self.state.cache.set_expiration_window(window);
    }

    /// Spawns a loop unless one is already running. Needs a tokio runtime.
    pub fn start(&self) -> Result<()> {
        // Held for the whole start so it cannot interleave with `rebind`.
        let bound = lock(&self.pipeline);
        let pipeline = bound.clone().ok_or(SensorError::NotConfigured)?;

        let Some(generation) = self.state.begin_run() else {
            debug!("Start requested while already listening");
            return Ok(());
        };

        let cancel = CancellationToken::new();
        let run = ListenLoop::new(
            pipeline,
            Arc::clone(&self.state),
            cancel.clone(),
            generation,
            self.settings.backoff,
        );
        let handle = tokio::spawn(run.run());

        // Earlier runs are already stopping; make sure they were told to and
        // keep their handles so `shutdown` can wait on them.
        let mut tasks = lock(&self.tasks);
        tasks.retain(|task| !task.handle.is_finished());
        for previous in tasks.iter() {
            previous.cancel.cancel();
        }
        tasks.push(ListenTask { cancel, handle });
        drop(tasks);
        drop(bound);

        info!("Started listening for speech and sentiment analysis");
        Ok(())
    }

    /// Clears the liveness flag and cancels the loop. Returns without waiting
    /// for the task to finish.
    pub fn stop(&self) {
        let was_running = self.state.request_stop();
        for task in lock(&self.tasks).iter() {
            task.cancel.cancel();
        }
        if was_running {
            info!("Stopped listening");
        }
    }

    /// Stops and waits for every loop task, including runs that were
    /// stopped earlier but had not exited yet. Reports the first failure.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop();

        let tasks = std::mem::take(&mut *lock(&self.tasks));
        if tasks.is_empty() {
            return Ok(());
        }

        let mut outcome = Ok(());
        for task in tasks {
            match task.handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!("Listen loop task failed: {}", e);
                    if outcome.is_ok() {
                        outcome = Err(SensorError::LoopJoin(e.to_string()));
                    }
                }
            }
        }

        let stats = self.state.telemetry.snapshot();
        info!(
            readings = stats.readings_stored,
            skipped = stats.silences_skipped,
            faults = stats.iteration_faults(),
            "Listen loop shut down"
        );
        outcome
    }

    pub fn is_listening(&self) -> bool {
        self.state.is_listening()
    }

    pub fn phase(&self) -> LoopPhase {
        self.state.phase()
    }

    pub fn status(&self) -> ListenStatus {
        ListenStatus {
            is_listening: self.state.is_listening(),
            has_reading: self.state.cache.has_reading(),
            expiration_window: self.state.cache.expiration_window(),
        }
    }

    /// Fresh reading if there is one, otherwise an empty default stamped now.
    pub fn get_latest(&self) -> LatestReading {
        let is_listening = self.state.is_listening();
        match self.state.cache.read() {
            Some(reading) => LatestReading {
                text_heard: reading.text,
                sentiment: reading.sentiment,
                time: reading.observed_at,
                is_listening,
            },
            None => LatestReading {
                text_heard: String::new(),
                sentiment: NO_SENTIMENT.to_string(),
                time: self.state.cache.now(),
                is_listening,
            },
        }
    }

    pub fn stats(&self) -> ListenStats {
        self.state.telemetry.snapshot()
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
