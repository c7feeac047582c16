//! Telemetry gateway for hospital devices.
//!
//! Patient vitals and robot status arrive over MQTT, are flattened into a
//! uniform field set, checked against static threshold rules, and fanned out
//! to an alert topic and an InfluxDB bucket.

pub mod app;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod evaluator;
pub mod fanout;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod mqtt;
pub mod readiness;
pub mod rules;
pub mod simulator;
pub mod sink;
pub mod storage;

pub use domain::{flatten, Alert, EntityType, FieldValue, TelemetryEvent};
pub use evaluator::evaluate;
pub use ingest::{route, ParseError};
pub use rules::{RuleSet, ThresholdRule};
