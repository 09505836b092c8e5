// ABOUTME: AlertManager API v2 client mapped to topology entities
// ABOUTME: Keeps only alerts that name both a service and a dependency

pub mod client;
pub mod error;

pub use client::{Alert, AlertManagerClient, AlertSource, AlertsConfig};
pub use error::{AlertsError, AlertsResult};
