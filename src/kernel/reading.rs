use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::time::{Clock, SystemClock};

pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(20);

/// Label substituted when the classifier response has no `sentiment` field.
pub const UNKNOWN_SENTIMENT: &str = "Unknown";

/// Label reported when there is no fresh reading to serve.
pub const NO_SENTIMENT: &str = "None";

/// The last heard utterance and its sentiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub text: String,
    pub sentiment: String,
    pub observed_at: DateTime<Utc>,
}

/// Single-slot, freshness-gated store for the latest [`Reading`].
///
/// Expiry is lazy: nothing sweeps the slot in the background, `read` checks the
/// window on access and clears the slot when it has passed. The check and the
/// clear run under the same lock, so a write landing concurrently is never
/// erased by a stale expiry decision.
pub struct ReadingCache {
    slot: Mutex<Option<Reading>>,
    window_ms: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl ReadingCache {
    pub fn new(expiration_window: Duration) -> Self {
        Self::with_clock(expiration_window, Arc::new(SystemClock))
    }

    pub fn with_clock(expiration_window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: Mutex::new(None),
            window_ms: AtomicU64::new(duration_to_ms(expiration_window)),
            clock,
        }
    }

    pub fn expiration_window(&self) -> Duration {
        Duration::from_millis(self.window_ms.load(Ordering::Acquire))
    }

    pub fn set_expiration_window(&self, window: Duration) {
        self.window_ms.store(duration_to_ms(window), Ordering::Release);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Replaces whatever is stored. `observed_at` never goes backwards, even if
    /// the wall clock does.
    pub fn write(&self, text: impl Into<String>, sentiment: impl Into<String>) {
        let now = self.clock.now();
        let mut slot = self.lock();
        let observed_at = match slot.as_ref() {
            Some(prev) if prev.observed_at > now => prev.observed_at,
            _ => now,
        };
        *slot = Some(Reading {
            text: text.into(),
            sentiment: sentiment.into(),
            observed_at,
        });
    }

    /// Returns the stored reading while it is fresh. A reading is stale once
    /// `now` is strictly after `observed_at + window`; a stale reading is
    /// dropped from the slot.
    pub fn read(&self) -> Option<Reading> {
        let now = self.clock.now();
        let window = chrono::Duration::from_std(self.expiration_window())
            .unwrap_or(chrono::Duration::MAX);

        let mut slot = self.lock();
        let expires_at = slot
            .as_ref()?
            .observed_at
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        if now > expires_at {
            *slot = None;
            return None;
        }
        slot.clone()
    }

    /// Peek without applying expiry.
    pub fn has_reading(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Reading>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ReadingCache {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRATION)
    }
}

impl std::fmt::Debug for ReadingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingCache")
            .field("has_reading", &self.has_reading())
            .field("expiration_window", &self.expiration_window())
            .finish()
    }
}

fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
