//! Capabilities the listen loop consumes. Both are opaque, possibly slow
//! external calls; the loop imposes no timeout on either.

use async_trait::async_trait;
use serde_json::{Map, Value};

pub mod sentiment;
pub mod speech;

/// Free-form response map returned by a sentiment classifier.
pub type ClassifierResponse = Map<String, Value>;

#[async_trait]
pub trait SpeechSource: Send + Sync {
    /// Waits for the next utterance. May suspend indefinitely.
    async fn listen(&self) -> anyhow::Result<String>;
}

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> anyhow::Result<ClassifierResponse>;
}
