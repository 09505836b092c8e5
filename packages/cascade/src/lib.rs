// ABOUTME: Cascade failure analysis: root causes, affected services, chains
// ABOUTME: Bidirectional BFS over critical edges of a built topology graph

pub mod engine;
pub mod types;

pub use engine::{analyze, analyze_for_service};
pub use types::{
    AffectedService, AnalysisResult, CascadeChain, Failure, Options, RootCause, Summary,
};
