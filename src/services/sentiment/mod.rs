pub mod client;

pub use client::HttpSentimentClassifier;
