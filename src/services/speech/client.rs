use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::super::SpeechSource;

/// Speech service reachable over HTTP. `POST {base_url}/listen` blocks until
/// the service has recognised an utterance and answers `{"text": "..."}`.
#[derive(Clone)]
pub struct HttpSpeechSource {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ListenResponse {
    #[serde(default)]
    text: String,
}

impl HttpSpeechSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        // No request timeout: listening legitimately waits for someone to speak.
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SpeechSource for HttpSpeechSource {
    async fn listen(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/listen", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Speech Service Error: {}", response.status()));
        }

        let body: ListenResponse = response.json().await?;
        Ok(body.text)
    }
}
