//! Retrieval-augmented question answering
//!
//! `QueryEngine::query_with_history` never fails: every degraded path
//! (no content, provider trouble, storage trouble) ends in the fixed
//! fallback answer with no sources.

mod context;
mod followup;
mod prompts;

pub use context::*;
pub use followup::*;
pub use prompts::*;

use crate::config::QueryConfig;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::provider::ModelProvider;
use crate::retrieve::{RetrievedChunk, VectorRetriever};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const EXCERPT_CHARS: usize = 200;

/// One prior question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// A cited material page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceDocument {
    pub material_id: String,
    pub material_title: String,
    pub course_id: String,
    pub page_number: Option<i64>,
    /// Best similarity among the chunks cited from this page
    pub score: f32,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub source_documents: Vec<SourceDocument>,
    pub follow_up_questions: Vec<String>,
}

impl QueryResponse {
    pub fn fallback() -> Self {
        Self {
            answer: FALLBACK_ANSWER.to_string(),
            source_documents: Vec::new(),
            follow_up_questions: Vec::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.answer == FALLBACK_ANSWER && self.source_documents.is_empty()
    }
}

/// Material and chunk totals for a course (or every course)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseStats {
    pub course_id: Option<String>,
    pub total_materials: u64,
    pub processed_materials: u64,
    pub total_chunks: u64,
    pub average_chunks_per_material: f64,
}

pub struct QueryEngine {
    db: MetaDb,
    retriever: VectorRetriever,
    provider: Arc<dyn ModelProvider>,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(db: MetaDb, provider: Arc<dyn ModelProvider>, config: &QueryConfig) -> Self {
        Self {
            retriever: VectorRetriever::new(db.clone()),
            db,
            provider,
            config: config.clone(),
        }
    }

    pub async fn query(&self, question: &str, course_id: Option<&str>) -> QueryResponse {
        self.query_with_history(question, &[], course_id).await
    }

    /// Answer `question` from the course's materials, using recent turns
    /// to resolve references
    pub async fn query_with_history(
        &self,
        question: &str,
        history: &[ChatTurn],
        course_id: Option<&str>,
    ) -> QueryResponse {
        let question = question.trim();
        if question.is_empty() {
            return QueryResponse::fallback();
        }
        info!(course_id = course_id.unwrap_or("*"), "Answering question");

        let query_vector = match self.provider.embed(vec![question.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.swap_remove(0),
            Ok(_) => {
                warn!("Provider returned no embedding for the question");
                return QueryResponse::fallback();
            }
            Err(e) => {
                warn!(error = %e, "Question embedding failed");
                return QueryResponse::fallback();
            }
        };
        if query_vector.len() != self.provider.dimension() {
            warn!(
                expected = self.provider.dimension(),
                got = query_vector.len(),
                "Question embedding has the wrong dimension"
            );
            return QueryResponse::fallback();
        }

        let chunks = match self
            .retriever
            .retrieve(
                &query_vector,
                course_id,
                self.config.top_k,
                self.config.min_score,
            )
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "Retrieval failed");
                return QueryResponse::fallback();
            }
        };
        if chunks.is_empty() {
            info!(
                course_id = course_id.unwrap_or("*"),
                "No relevant content found"
            );
            return QueryResponse::fallback();
        }

        let assembled = assemble_context(&chunks, history, &self.config);
        if assembled.chunks_used == 0 {
            warn!("Context budget left no room for retrieved content");
            return QueryResponse::fallback();
        }
        let used = &chunks[..assembled.chunks_used];
        debug!(
            chunks = assembled.chunks_used,
            turns = assembled.turns_used,
            "Assembled context"
        );

        let context = system_context(&assembled.excerpts);
        let prompt = answer_prompt(question, &assembled.history);
        let answer = match self.provider.generate(&prompt, &context).await {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => {
                warn!("Provider returned an empty answer");
                return QueryResponse::fallback();
            }
            Err(e) => {
                warn!(error = %e, "Answer generation failed");
                return QueryResponse::fallback();
            }
        };

        let source_documents = collect_sources(used);
        let follow_up_questions = suggest_follow_ups(
            self.provider.as_ref(),
            question,
            &answer,
            &assembled.excerpts,
            &source_documents,
            &self.config,
        )
        .await;

        QueryResponse {
            answer,
            source_documents,
            follow_up_questions,
        }
    }

    pub async fn get_course_stats(&self, course_id: Option<&str>) -> Result<CourseStats> {
        let counts = self.db.material_counts(course_id).await?;
        let average_chunks_per_material = if counts.processed_materials > 0 {
            counts.total_chunks as f64 / counts.processed_materials as f64
        } else {
            0.0
        };

        Ok(CourseStats {
            course_id: course_id.map(str::to_string),
            total_materials: counts.total_materials,
            processed_materials: counts.processed_materials,
            total_chunks: counts.total_chunks,
            average_chunks_per_material,
        })
    }
}

/// One entry per `(material_id, page_number)`, in first-cited order
pub fn collect_sources(chunks: &[RetrievedChunk]) -> Vec<SourceDocument> {
    let mut sources: Vec<SourceDocument> = Vec::new();
    let mut positions: HashMap<(String, Option<i64>), usize> = HashMap::new();

    for chunk in chunks {
        let key = (chunk.material_id.clone(), chunk.page_number);
        match positions.get(&key) {
            Some(&i) => {
                if chunk.score > sources[i].score {
                    sources[i].score = chunk.score;
                }
            }
            None => {
                positions.insert(key, sources.len());
                sources.push(SourceDocument {
                    material_id: chunk.material_id.clone(),
                    material_title: chunk.material_title.clone(),
                    course_id: chunk.course_id.clone(),
                    page_number: chunk.page_number,
                    score: chunk.score,
                    excerpt: truncate_chars(&chunk.content, EXCERPT_CHARS),
                });
            }
        }
    }
    sources
}
