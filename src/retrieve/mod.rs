//! Vector retrieval over persisted chunk embeddings
//!
//! Brute-force cosine similarity against every eligible chunk. Eligibility
//! is decided in SQL (processed materials, optional course) before any
//! scoring happens.

use crate::error::Result;
use crate::meta::{decode_embedding, MetaDb, SearchableChunk};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;

/// A chunk ranked against a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub material_id: String,
    pub material_title: String,
    pub course_id: String,
    pub content: String,
    pub chunk_index: i64,
    pub page_number: Option<i64>,
    pub score: f32,
    #[serde(skip)]
    pub material_created_at: String,
}

#[derive(Clone)]
pub struct VectorRetriever {
    db: MetaDb,
}

impl VectorRetriever {
    pub fn new(db: MetaDb) -> Self {
        Self { db }
    }

    /// Top `top_k` chunks by cosine similarity, most similar first
    pub async fn retrieve(
        &self,
        query_embedding: &[f32],
        course_id: Option<&str>,
        top_k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.db.list_searchable_chunks(course_id).await?;
        let searched = candidates.len();
        let mut ranked = rank_candidates(query_embedding, candidates, min_score);
        ranked.truncate(top_k);

        debug!(
            course_id = course_id.unwrap_or("*"),
            searched,
            returned = ranked.len(),
            "Retrieved chunks"
        );
        Ok(ranked)
    }
}

fn rank_candidates(
    query: &[f32],
    candidates: Vec<SearchableChunk>,
    min_score: Option<f32>,
) -> Vec<RetrievedChunk> {
    let mut ranked: Vec<RetrievedChunk> = candidates
        .into_iter()
        .filter_map(|c| {
            let embedding = decode_embedding(&c.embedding)?;
            if embedding.len() != query.len() {
                return None;
            }
            let score = cosine_similarity(query, &embedding);
            if min_score.is_some_and(|min| score < min) {
                return None;
            }
            Some(RetrievedChunk {
                chunk_id: c.chunk_id,
                material_id: c.material_id,
                material_title: c.material_title,
                course_id: c.course_id,
                content: c.content,
                chunk_index: c.chunk_index,
                page_number: c.page_number,
                score,
                material_created_at: c.material_created_at,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.material_created_at.cmp(&a.material_created_at))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    ranked
}

/// Cosine similarity; 0.0 when either vector has zero length or norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if score.is_finite() {
        score
    } else {
        0.0
    }
}
