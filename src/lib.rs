pub mod error;
pub mod kernel;
pub mod sensor;
pub mod services;

// Re-export the pieces a host needs to wire a sensor up
pub use error::{ConfigError, Result, SensorError};
pub use kernel::controller::{LatestReading, LifecycleController, ListenStatus, LoopSettings};
pub use kernel::reading::{Reading, ReadingCache};
pub use sensor::{Dependencies, SpeechSentimentSensor};
pub use services::{ClassifierResponse, SentimentClassifier, SpeechSource};
