// ABOUTME: Single-slot TTL cache for the last unfiltered topology response
// ABOUTME: Computes content-addressed ETags over nodes, edges, and alerts

use std::sync::Arc;
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::{AlertInfo, Edge, Node, TopologyResponse};

struct Slot {
    data: Arc<TopologyResponse>,
    etag: String,
    set_at: Instant,
}

/// In-memory cache holding the most recent unfiltered live response.
/// Expiry is lazy; readers never observe a torn slot.
pub struct TopologyCache {
    ttl: Duration,
    slot: RwLock<Option<Slot>>,
}

impl TopologyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// Returns the cached response if present and not expired.
    pub async fn get(&self) -> Option<Arc<TopologyResponse>> {
        let guard = self.slot.read().await;
        let slot = guard.as_ref()?;
        if slot.set_at.elapsed() > self.ttl {
            return None;
        }
        Some(Arc::clone(&slot.data))
    }

    /// Returns the cached response along with its ETag.
    pub async fn get_with_etag(&self) -> Option<(Arc<TopologyResponse>, String)> {
        let guard = self.slot.read().await;
        let slot = guard.as_ref()?;
        if slot.set_at.elapsed() > self.ttl {
            return None;
        }
        Some((Arc::clone(&slot.data), slot.etag.clone()))
    }

    /// Stores a response, stamping it with the current time, and returns
    /// the computed ETag. The slot is replaced atomically.
    pub async fn set(&self, resp: TopologyResponse) -> String {
        let etag = compute_etag(&resp);
        let mut guard = self.slot.write().await;
        *guard = Some(Slot {
            data: Arc::new(resp),
            etag: etag.clone(),
            set_at: Instant::now(),
        });
        etag
    }
}

/// The ETag covers nodes, edges, and alerts only. Meta is excluded so
/// the changing `cachedAt` timestamp does not perturb it.
#[derive(Serialize)]
struct Hashable<'a> {
    nodes: &'a [Node],
    edges: &'a [Edge],
    alerts: &'a [AlertInfo],
}

pub(crate) fn compute_etag(resp: &TopologyResponse) -> String {
    let hashable = Hashable {
        nodes: &resp.nodes,
        edges: &resp.edges,
        alerts: &resp.alerts,
    };
    let encoded = serde_json::to_vec(&hashable).unwrap_or_default();
    let digest = Md5::digest(&encoded);
    format!("\"{}\"", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TopologyMeta;
    use chrono::Utc;

    fn response(node_id: &str) -> TopologyResponse {
        TopologyResponse {
            nodes: vec![Node {
                id: node_id.to_string(),
                label: node_id.to_string(),
                state: "ok".to_string(),
                kind: "service".to_string(),
                ..Default::default()
            }],
            edges: vec![],
            alerts: vec![],
            meta: TopologyMeta {
                cached_at: Utc::now(),
                ttl_seconds: 15,
                node_count: 1,
                edge_count: 0,
                partial: false,
                errors: vec![],
                time: None,
                is_history: false,
            },
        }
    }

    #[tokio::test]
    async fn get_returns_stored_response_while_fresh() {
        let cache = TopologyCache::new(Duration::from_secs(60));
        assert!(cache.get().await.is_none());

        cache.set(response("svc-a")).await;
        let cached = cache.get().await.expect("fresh entry");
        assert_eq!(cached.nodes[0].id, "svc-a");
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        let cache = TopologyCache::new(Duration::ZERO);
        cache.set(response("svc-a")).await;
        assert!(cache.get().await.is_none());
        assert!(cache.get_with_etag().await.is_none());
    }

    #[tokio::test]
    async fn etag_is_stable_for_equal_content() {
        let cache = TopologyCache::new(Duration::from_secs(60));
        let first = cache.set(response("svc-a")).await;
        let second = cache.set(response("svc-a")).await;
        assert_eq!(first, second);
        assert!(first.starts_with('"') && first.ends_with('"'));
    }

    #[tokio::test]
    async fn etag_changes_with_content() {
        let cache = TopologyCache::new(Duration::from_secs(60));
        let first = cache.set(response("svc-a")).await;
        let second = cache.set(response("svc-b")).await;
        assert_ne!(first, second);
    }

    #[test]
    fn etag_ignores_meta() {
        let mut a = response("svc-a");
        let mut b = response("svc-a");
        a.meta.ttl_seconds = 15;
        b.meta.ttl_seconds = 600;
        b.meta.partial = true;
        assert_eq!(compute_etag(&a), compute_etag(&b));
    }
}
