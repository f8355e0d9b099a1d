use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConfigError, DependencyKind};
use crate::services::{SentimentClassifier, SpeechSource};

/// Resolved dependencies, keyed by the names used in the sensor attributes.
/// Each capability is stored under its own type so a lookup either yields the
/// right interface or fails at configuration time.
#[derive(Clone, Default)]
pub struct Dependencies {
    speech: HashMap<String, Arc<dyn SpeechSource>>,
    sentiment: HashMap<String, Arc<dyn SentimentClassifier>>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speech_source(mut self, name: impl Into<String>, source: Arc<dyn SpeechSource>) -> Self {
        self.insert_speech_source(name, source);
        self
    }

    pub fn with_classifier(
        mut self,
        name: impl Into<String>,
        classifier: Arc<dyn SentimentClassifier>,
    ) -> Self {
        self.insert_classifier(name, classifier);
        self
    }

    pub fn insert_speech_source(&mut self, name: impl Into<String>, source: Arc<dyn SpeechSource>) {
        self.speech.insert(name.into(), source);
    }

    pub fn insert_classifier(&mut self, name: impl Into<String>, classifier: Arc<dyn SentimentClassifier>) {
        self.sentiment.insert(name.into(), classifier);
    }

    pub fn speech_source(&self, name: &str) -> Result<Arc<dyn SpeechSource>, ConfigError> {
        self.speech
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnresolvedDependency {
                kind: DependencyKind::SpeechService,
                name: name.to_string(),
            })
    }

    pub fn classifier(&self, name: &str) -> Result<Arc<dyn SentimentClassifier>, ConfigError> {
        self.sentiment
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnresolvedDependency {
                kind: DependencyKind::SentimentService,
                name: name.to_string(),
            })
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("speech", &self.speech.keys().collect::<Vec<_>>())
            .field("sentiment", &self.sentiment.keys().collect::<Vec<_>>())
            .finish()
    }
}
