// ABOUTME: Core topology domain: response model, graph builder, ETag cache
// ABOUTME: Fuses PromQL edge data with alert overlays into one response

pub mod builder;
pub mod cache;
pub mod models;

pub use builder::{BuildError, GraphBuilder};
pub use cache::TopologyCache;
pub use models::{
    AlertInfo, Edge, GrafanaConfig, Node, SeverityLevel, TopologyMeta, TopologyResponse,
};
