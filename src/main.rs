use anyhow::{Context, Result};
use mic_sentiment::sensor::{Attributes, Dependencies, SharedSensor, SpeechSentimentSensor};
use mic_sentiment::services::sentiment::HttpSentimentClassifier;
use mic_sentiment::services::speech::HttpSpeechSource;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const CONFIG_ENV: &str = "MIC_SENTIMENT_CONFIG";

/// Process file: the sensor's attributes plus where its services live.
#[derive(Debug, Deserialize)]
struct ProcessConfig {
    #[serde(default = "default_name")]
    name: String,
    attributes: Attributes,
    /// Speech service name -> base URL.
    #[serde(default)]
    speech_services: HashMap<String, String>,
    /// Sentiment service name -> base URL.
    #[serde(default)]
    sentiment_services: HashMap<String, String>,
    #[serde(default = "default_poll_seconds")]
    poll_interval_seconds: u64,
}

fn default_name() -> String {
    "mic-speech-sentiment".to_string()
}

fn default_poll_seconds() -> u64 {
    5
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Setup Logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    // 2. Load Config
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .with_context(|| format!("usage: mic-sentiment <config.json> (or set {})", CONFIG_ENV))?;
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path))?;
    let config: ProcessConfig = serde_json::from_str(&raw).with_context(|| format!("invalid config in {}", path))?;

    let required = SpeechSentimentSensor::validate_config(&config.attributes)?;
    tracing::info!("Sensor '{}' requires dependencies: {:?}", config.name, required);

    // 3. Resolve Services
    let mut deps = Dependencies::new();
    for (name, url) in &config.speech_services {
        deps.insert_speech_source(name.clone(), Arc::new(HttpSpeechSource::new(url.clone())));
    }
    for (name, url) in &config.sentiment_services {
        deps.insert_classifier(name.clone(), Arc::new(HttpSentimentClassifier::new(url.clone())));
    }

    // 4. Start Sensor
    let sensor: SharedSensor = Arc::new(SpeechSentimentSensor::new(config.name.clone(), &config.attributes, &deps).await?);

    let mut cadence = tokio::time::interval(Duration::from_secs(config.poll_interval_seconds.max(1)));
    cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!("Sensor active. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = cadence.tick() => {
                let reading = sensor.get_readings_map();
                tracing::info!("Reading: {}", serde_json::Value::Object(reading));
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    // 5. Teardown
    sensor.close().await?;
    let stats = sensor.controller().stats();
    tracing::info!(
        "Session: {} readings, {} silent, {} faults, {} fatal",
        stats.readings_stored,
        stats.silences_skipped,
        stats.iteration_faults(),
        stats.loops_fatal
    );
    Ok(())
}
