use std::collections::VecDeque;
use std::sync::Mutex;

use super::event::TelemetryEvent;
use super::metrics::ListenStats;

const MAX_EVENTS: usize = 1_000;

/// Bounded event log plus running totals. Totals survive the log rolling over.
#[derive(Debug)]
pub struct TelemetryRecorder {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    buffer: VecDeque<TelemetryEvent>,
    totals: ListenStats,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: VecDeque::with_capacity(64),
                totals: ListenStats::default(),
            }),
        }
    }

    pub fn record(&self, event: TelemetryEvent) {
        let mut inner = self.lock();
        if inner.buffer.len() >= MAX_EVENTS {
            inner.buffer.pop_front();
        }
        inner.totals.apply(&event);
        inner.buffer.push_back(event);
    }

    pub fn snapshot(&self) -> ListenStats {
        self.lock().totals
    }

    /// Most recent events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<TelemetryEvent> {
        let inner = self.lock();
        let skip = inner.buffer.len().saturating_sub(limit);
        inner.buffer.iter().skip(skip).copied().collect()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.buffer.clear();
        inner.totals = ListenStats::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}
