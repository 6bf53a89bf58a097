pub mod adapters;
pub mod config;
pub mod domain;
pub mod routes;
pub mod startup;
pub mod telemetry;
