#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use mic_sentiment::services::{ClassifierResponse, SentimentClassifier, SpeechSource};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// What the fake speech source does on its next `listen`.
pub enum Heard {
    Text(String),
    Fail(String),
    Panic,
}

/// Speech source fed from a channel. Once the channel is empty it blocks
/// like a real microphone waiting for someone to talk.
pub struct ChannelSpeech {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Heard>>,
    pub calls: AtomicUsize,
}

impl ChannelSpeech {
    pub fn new() -> (Self, mpsc::UnboundedSender<Heard>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            rx: tokio::sync::Mutex::new(rx),
            calls: AtomicUsize::new(0),
        };
        (source, tx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSource for ChannelSpeech {
    async fn listen(&self) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.rx.lock().await.recv().await;
        match next {
            Some(Heard::Text(text)) => Ok(text),
            Some(Heard::Fail(reason)) => Err(anyhow!(reason)),
            Some(Heard::Panic) => panic!("microphone exploded"),
            None => std::future::pending().await,
        }
    }
}

pub enum Verdict {
    Respond(Value),
    Fail(String),
    /// Never answers.
    Hang,
}

/// Classifier that plays back scripted verdicts, then falls back to
/// `{"sentiment": "positive"}`.
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Verdict>>,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedClassifier {
    pub fn new(script: Vec<Verdict>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn positive() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl SentimentClassifier for ScriptedClassifier {
    async fn classify(&self, text: &str) -> anyhow::Result<ClassifierResponse> {
        self.seen.lock().unwrap().push(text.to_string());
        let verdict = self.script.lock().unwrap().pop_front();
        let value = match verdict {
            Some(Verdict::Respond(value)) => value,
            Some(Verdict::Fail(reason)) => return Err(anyhow!(reason)),
            Some(Verdict::Hang) => std::future::pending().await,
            None => json!({ "sentiment": "positive" }),
        };
        Ok(value.as_object().cloned().unwrap_or_default())
    }
}

pub fn text(s: &str) -> Heard {
    Heard::Text(s.to_string())
}

/// Polls `cond` until it holds or two seconds pass.
pub async fn wait_until<F>(mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    poll_until(Duration::from_secs(2), move || {
        let ok = cond();
        async move { ok }
    })
    .await
}

async fn poll_until<F, Fut>(limit: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if cond().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
