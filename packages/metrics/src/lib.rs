// ABOUTME: PromQL client for dependency-health topology discovery
// ABOUTME: Issues instant/range queries and decodes labelled vector results

pub mod client;
pub mod error;
pub mod types;

pub use client::{MetricsBackend, MetricsConfig, PrometheusClient};
pub use error::{MetricsError, MetricsResult};
pub use types::{
    EdgeKey, HistoricalAlert, Instance, QueryOptions, RangeResult, TimeValue, TopologyEdge,
};
