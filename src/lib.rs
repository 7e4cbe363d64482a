//! DSMR P1 smart meter bridge
//!
//! Reads P1 telegrams from a serial port, keeps the last known meter values and
//! publishes electricity and gas readings once per telegram.

pub mod config;
pub mod metering_p1;
pub mod mqtt;
pub mod obis_utils;
pub mod sink;

// Re-export common types for easier access
pub use config::Config;
pub use metering_p1::P1Manager;
pub use metering_p1::parser::TelegramParser;
pub use metering_p1::structs::{ParserOptions, Readings, Snapshot};
pub use mqtt::{MqttManager, MqttSink};
pub use sink::{Measurement, ReadingSink, SinkError};
