//! Listen-loop telemetry.
//!
//! # SAFETY INVARIANT
//! Telemetry is a READ-ONLY side-effect layer. The listen loop never reads it
//! to decide what to do next.
//!
//! # PRIVACY INVARIANT
//! Telemetry events must **NEVER** contain user content (utterance text or
//! sentiment labels). Only counts, generations and durations are allowed.

pub mod event;
pub mod metrics;
pub mod recorder;
