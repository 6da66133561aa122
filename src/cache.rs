//! In-process search-result and document-metadata caches.
//!
//! Invalidation is coarse by design: any document mutation clears the
//! entire search-result cache rather than computing which cached queries
//! might be affected. This trades a few redundant re-searches for the
//! guarantee that a cached result never outlives the data it was computed
//! from.

use std::collections::HashMap;
use std::sync::RwLock;

use md5::{Digest, Md5};
use serde_json::Value as Json;

use crate::models::ScoredChunk;

fn cache_key(user_id: &str, query: &str, k: usize, threshold: f32, sources: &[String]) -> String {
    let mut sorted = sources.to_vec();
    sorted.sort();
    let normalized_query = query.trim().to_lowercase();
    let raw = format!(
        "{user_id}|{normalized_query}|{k}|{threshold}|{}",
        sorted.join(",")
    );
    let mut hasher = Md5::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct SearchCache {
    results: RwLock<HashMap<String, Vec<ScoredChunk>>>,
    document_metadata: RwLock<HashMap<uuid::Uuid, Json>>,
}

impl Default for SearchCache {
    fn default() -> Self {
        SearchCache {
            results: RwLock::new(HashMap::new()),
            document_metadata: RwLock::new(HashMap::new()),
        }
    }
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        user_id: &str,
        query: &str,
        k: usize,
        threshold: f32,
        sources: &[String],
    ) -> Option<Vec<ScoredChunk>> {
        let key = cache_key(user_id, query, k, threshold, sources);
        self.results.read().unwrap().get(&key).cloned()
    }

    pub fn put(
        &self,
        user_id: &str,
        query: &str,
        k: usize,
        threshold: f32,
        sources: &[String],
        results: Vec<ScoredChunk>,
    ) {
        let key = cache_key(user_id, query, k, threshold, sources);
        self.results.write().unwrap().insert(key, results);
    }

    /// Clears every cached search result. Called on any document write
    /// (add/update/delete) and on explicit cache-clear requests.
    pub fn clear_search_results(&self) {
        self.results.write().unwrap().clear();
    }

    pub fn get_document_metadata(&self, document_id: uuid::Uuid) -> Option<Json> {
        self.document_metadata.read().unwrap().get(&document_id).cloned()
    }

    pub fn put_document_metadata(&self, document_id: uuid::Uuid, metadata: Json) {
        self.document_metadata
            .write()
            .unwrap()
            .insert(document_id, metadata);
    }

    pub fn invalidate_document_metadata(&self, document_id: Option<uuid::Uuid>) {
        match document_id {
            Some(id) => {
                self.document_metadata.write().unwrap().remove(&id);
            }
            None => {
                self.document_metadata.write().unwrap().clear();
            }
        }
    }

    /// Invalidates everything — called after ingestion, reconciliation, or
    /// an explicit cache-clear request.
    pub fn invalidate_all(&self) {
        self.clear_search_results();
        self.invalidate_document_metadata(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_regardless_of_source_order() {
        let a = cache_key("u1", "hello", 5, 0.1, &["website".into(), "portal".into()]);
        let b = cache_key("u1", "hello", 5, 0.1, &["portal".into(), "website".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn cache_key_is_case_and_whitespace_insensitive_on_query() {
        let a = cache_key("u1", "  Hello World  ", 5, 0.1, &[]);
        let b = cache_key("u1", "hello world", 5, 0.1, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = SearchCache::new();
        let sources = vec!["website".to_string()];
        assert!(cache.get("u1", "q", 5, 0.1, &sources).is_none());
        cache.put("u1", "q", 5, 0.1, &sources, Vec::new());
        assert!(cache.get("u1", "q", 5, 0.1, &sources).is_some());
        cache.clear_search_results();
        assert!(cache.get("u1", "q", 5, 0.1, &sources).is_none());
    }
}
