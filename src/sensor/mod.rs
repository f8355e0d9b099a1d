//! Host-facing sensor: configuration, readings, commands and teardown
//! wrapped around a [`LifecycleController`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{ConfigError, Result};
use crate::kernel::controller::{LatestReading, LifecycleController, LoopSettings};
use crate::kernel::listener::Pipeline;
use crate::kernel::reading::ReadingCache;

pub mod command;
pub mod config;
pub mod registry;

pub use command::Command;
pub use config::{validate_config, Attributes, SensorConfig};
pub use registry::Dependencies;

/// Static geometry entry. The sensor has none; the type exists for the
/// host's geometry query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub label: String,
}

/// Which services the running loop was bound to.
struct Binding {
    speech_service: String,
    sentiment_service: String,
    pipeline: Pipeline,
}

impl Binding {
    fn matches(&self, config: &SensorConfig, pipeline: &Pipeline) -> bool {
        self.speech_service == config.speech_service
            && self.sentiment_service == config.sentiment_service
            && same_object(&*self.pipeline.speech, &*pipeline.speech)
            && same_object(&*self.pipeline.classifier, &*pipeline.classifier)
    }
}

// Compares data pointers only; vtable pointers for the same type can differ
// between codegen units.
fn same_object<T: ?Sized>(a: &T, b: &T) -> bool {
    std::ptr::eq(a as *const T as *const (), b as *const T as *const ())
}

pub struct SpeechSentimentSensor {
    name: String,
    controller: LifecycleController,
    // Async mutex: held across the await in `reconfigure` so two
    // reconfigurations cannot interleave their stop/rebind/start. The
    // start command takes it too, so it never lands mid-rebind.
    binding: Mutex<Option<Binding>>,
}

impl SpeechSentimentSensor {
    /// Builds the sensor and applies its first configuration, which starts
    /// listening.
    pub async fn new(
        name: impl Into<String>,
        attributes: &Attributes,
        dependencies: &Dependencies,
    ) -> Result<Self> {
        let sensor = Self::with_controller(
            name,
            LifecycleController::with_settings(ReadingCache::default(), LoopSettings::default()),
        );
        sensor.reconfigure(attributes, dependencies).await?;
        Ok(sensor)
    }

    /// Unconfigured sensor over a caller-supplied controller.
    pub fn with_controller(name: impl Into<String>, controller: LifecycleController) -> Self {
        Self {
            name: name.into(),
            controller,
            binding: Mutex::new(None),
        }
    }

    pub fn validate_config(attributes: &Attributes) -> std::result::Result<Vec<String>, ConfigError> {
        validate_config(attributes)
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    /// Applies new attributes. Dependencies are resolved before anything is
    /// touched, so a bad configuration leaves the current loop as it was.
    /// If the backing services change, the old loop is stopped and awaited
    /// before the new one starts.
    pub async fn reconfigure(&self, attributes: &Attributes, dependencies: &Dependencies) -> Result<()> {
        let config = SensorConfig::from_attributes(attributes)?;
        let pipeline = Pipeline::new(
            dependencies.speech_source(&config.speech_service)?,
            dependencies.classifier(&config.sentiment_service)?,
        );

        let mut binding = self.binding.lock().await;
        self.controller.set_expiration_window(config.expiration_window());

        let changed = binding
            .as_ref()
            .map_or(true, |current| !current.matches(&config, &pipeline));
        if changed {
            if binding.is_some() {
                info!(sensor = %self.name, "Dependencies changed, restarting listen loop");
            }
            if let Err(e) = self.controller.rebind(pipeline.clone()).await {
                warn!(sensor = %self.name, "Previous listen loop did not exit cleanly: {}", e);
            }
            *binding = Some(Binding {
                speech_service: config.speech_service.clone(),
                sentiment_service: config.sentiment_service.clone(),
                pipeline,
            });
        }

        info!(
            "Configured with speech_service: {}, sentiment_service: {}, reading_expiration_seconds: {}",
            config.speech_service, config.sentiment_service, config.reading_expiration_seconds
        );

        self.controller.start()
    }

    pub fn get_readings(&self) -> LatestReading {
        self.controller.get_latest()
    }

    pub fn get_readings_map(&self) -> Map<String, Value> {
        self.get_readings().to_map()
    }

    /// Never fails: unknown commands and start failures come back as an
    /// `error` entry in the response.
    pub async fn do_command(&self, request: &Map<String, Value>) -> Map<String, Value> {
        match Command::parse(request) {
            Command::StartListening => {
                let _binding = self.binding.lock().await;
                match self.controller.start() {
                    Ok(()) => command::status_response("started"),
                    Err(e) => command::error_response(e.to_string()),
                }
            }
            Command::StopListening => {
                self.controller.stop();
                command::status_response("stopped")
            }
            Command::GetStatus => command::listen_status(&self.controller.status()),
            Command::Unknown(name) => command::unknown_command(&name),
        }
    }

    pub fn get_geometries(&self) -> Vec<Geometry> {
        Vec::new()
    }

    /// Stops the loop and waits for it to exit.
    pub async fn close(&self) -> Result<()> {
        info!(sensor = %self.name, "Closing sensor");
        self.controller.shutdown().await
    }
}

impl std::fmt::Debug for SpeechSentimentSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSentimentSensor")
            .field("name", &self.name)
            .field("status", &self.controller.status())
            .finish()
    }
}

pub type SharedSensor = Arc<SpeechSentimentSensor>;
