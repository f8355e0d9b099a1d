pub mod controller;
pub mod listener;
pub mod reading;
pub mod state;
pub mod telemetry;
pub mod time;
