pub mod config;
pub mod telemetry;
pub mod web;
pub mod worker;
