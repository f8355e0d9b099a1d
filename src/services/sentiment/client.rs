use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::super::{ClassifierResponse, SentimentClassifier};

const COMMAND: &str = "get_sentiment";

/// Sentiment service driven through its generic command endpoint:
/// `POST {base_url}/do_command` with `{"command": "get_sentiment", "text": ...}`.
#[derive(Clone)]
pub struct HttpSentimentClassifier {
    client: Client,
    base_url: String,
}

impl HttpSentimentClassifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(
            Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            base_url,
        )
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SentimentClassifier for HttpSentimentClassifier {
    async fn classify(&self, text: &str) -> Result<ClassifierResponse> {
        let response = self
            .client
            .post(format!("{}/do_command", self.base_url))
            .json(&json!({ "command": COMMAND, "text": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Sentiment Service Error: {}", response.status()));
        }

        let body: ClassifierResponse = response.json().await?;
        Ok(body)
    }
}
