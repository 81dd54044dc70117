// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Semantic memory store, backed by Qdrant's HTTP REST API.
//!
//! Failures here are best-effort: `search` returns an empty list and logs a
//! warning rather than propagating an error, and `upsert` logs and returns
//! without raising, mirroring the original Python service's "memory is an
//! enhancement, never a blocker" contract.

use std::collections::HashMap;

use chrono::Utc;
use relay_config::MemoryConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum MemoryError {
    #[error("qdrant request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("qdrant returned an error response: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

/// A point to be stored: the caller supplies the already-computed embedding
/// (embedding generation lives outside this crate, in the model layer).
#[derive(Debug, Clone)]
pub struct MemoryPoint {
    pub user_id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub memory_type: String,
    pub source_agent: Option<String>,
    /// Any additional free-form payload fields.
    pub extra: HashMap<String, Value>,
}

/// A scored search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub text: String,
    pub relevance_score: f32,
    pub memory_type: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Optional filters applied in addition to the mandatory `user_id` match.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub source_agent: Option<String>,
    pub memory_type: Option<String>,
    pub min_timestamp: Option<String>,
    pub max_timestamp: Option<String>,
}

pub struct MemoryService {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    vector_dim: usize,
}

impl MemoryService {
    pub fn new(cfg: &MemoryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: cfg.qdrant_url.trim_end_matches('/').to_string(),
            collection: cfg.collection.clone(),
            vector_dim: cfg.vector_dim,
        }
    }

    /// Creates the collection if it does not already exist, with a cosine
    /// distance metric and keyword/datetime payload indexes on the fields
    /// the search path filters on.
    pub async fn ensure_collection(&self) -> Result<()> {
        let url = format!("{}/collections/{}", self.base_url, self.collection);
        let resp = self.client.get(&url).send().await?;
        if resp.status().is_success() {
            return Ok(());
        }

        let create_url = format!("{}/collections/{}", self.base_url, self.collection);
        let body = json!({
            "vectors": { "size": self.vector_dim, "distance": "Cosine" },
        });
        let resp = self.client.put(&create_url).json(&body).send().await?;
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(MemoryError::Api(text));
        }

        for field in ["user_id", "memory_type", "source_agent"] {
            self.create_keyword_index(field).await.ok();
        }
        self.create_index("timestamp", "datetime").await.ok();

        Ok(())
    }

    async fn create_keyword_index(&self, field: &str) -> Result<()> {
        self.create_index(field, "keyword").await
    }

    async fn create_index(&self, field: &str, schema: &str) -> Result<()> {
        let url = format!(
            "{}/collections/{}/index",
            self.base_url, self.collection
        );
        let body = json!({ "field_name": field, "field_schema": schema });
        self.client.put(&url).json(&body).send().await?;
        Ok(())
    }

    /// Upserts a batch of points. Best-effort: logs and swallows failures
    /// rather than propagating.
    pub async fn upsert(&self, points: Vec<MemoryPoint>) {
        if points.is_empty() {
            return;
        }
        if let Err(e) = self.ensure_collection().await {
            tracing::warn!(error = %e, "failed to ensure memory collection exists");
            return;
        }

        let qdrant_points: Vec<Value> = points
            .into_iter()
            .map(|p| {
                let mut payload = json!({
                    "user_id": p.user_id,
                    "text": p.text,
                    "timestamp": Utc::now().to_rfc3339(),
                    "memory_type": p.memory_type,
                });
                if let Some(agent) = &p.source_agent {
                    payload["source_agent"] = json!(agent);
                }
                if let Value::Object(ref mut map) = payload {
                    for (k, v) in p.extra {
                        map.entry(k).or_insert(v);
                    }
                }
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "vector": p.vector,
                    "payload": payload,
                })
            })
            .collect();

        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, self.collection
        );
        match self
            .client
            .put(&url)
            .json(&json!({ "points": qdrant_points }))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "qdrant upsert returned non-success status");
            }
            Err(e) => {
                tracing::warn!(error = %e, "qdrant upsert request failed");
            }
        }
    }

    /// Searches the store with an already-embedded query vector. Best
    /// effort: any failure returns an empty list.
    pub async fn search(
        &self,
        query_vector: Vec<f32>,
        user_id: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> Vec<MemoryHit> {
        match self.search_inner(query_vector, user_id, limit, filter).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "memory search failed, returning empty result");
                Vec::new()
            }
        }
    }

    async fn search_inner(
        &self,
        query_vector: Vec<f32>,
        user_id: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<MemoryHit>> {
        let mut must = vec![json!({ "key": "user_id", "match": { "value": user_id } })];
        if let Some(agent) = &filter.source_agent {
            must.push(json!({ "key": "source_agent", "match": { "value": agent } }));
        }
        if let Some(mt) = &filter.memory_type {
            must.push(json!({ "key": "memory_type", "match": { "value": mt } }));
        }
        if filter.min_timestamp.is_some() || filter.max_timestamp.is_some() {
            let mut range = serde_json::Map::new();
            if let Some(min) = &filter.min_timestamp {
                range.insert("gte".into(), json!(min));
            }
            if let Some(max) = &filter.max_timestamp {
                range.insert("lte".into(), json!(max));
            }
            must.push(json!({ "key": "timestamp", "range": range }));
        }

        let url = format!(
            "{}/collections/{}/points/query",
            self.base_url, self.collection
        );
        let body = json!({
            "query": query_vector,
            "filter": { "must": must },
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(MemoryError::Api(resp.text().await.unwrap_or_default()));
        }

        let parsed: QueryResponse = resp.json().await?;
        Ok(parsed
            .result
            .points
            .into_iter()
            .map(|p| {
                let mut extra = HashMap::new();
                let memory_type = p
                    .payload
                    .get("memory_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("general")
                    .to_string();
                let text = p
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let timestamp = p
                    .payload
                    .get("timestamp")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                for (k, v) in p.payload {
                    if k != "user_id" && k != "text" && k != "memory_type" && k != "timestamp" {
                        extra.insert(k, v);
                    }
                }
                MemoryHit {
                    text,
                    relevance_score: p.score,
                    memory_type,
                    timestamp,
                    extra,
                }
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResult,
}

#[derive(Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: serde_json::Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_filter_default_has_no_constraints() {
        let f = SearchFilter::default();
        assert!(f.source_agent.is_none());
        assert!(f.memory_type.is_none());
    }

    #[test]
    fn memory_service_strips_trailing_slash_from_base_url() {
        let cfg = MemoryConfig {
            qdrant_url: "http://localhost:6333/".into(),
            collection: "test".into(),
            vector_dim: 768,
        };
        let svc = MemoryService::new(&cfg);
        assert_eq!(svc.base_url, "http://localhost:6333");
    }
}
