pub mod client;

pub use client::HttpSpeechSource;
