//! lectern: course material ingestion queue and question answering
//!
//! Uploaded materials are queued, fetched, split into page-aware chunks and
//! embedded. Questions are answered from the most similar chunks.

pub mod api;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod logging;
pub mod meta;
pub mod parse;
pub mod provider;
pub mod queue;
pub mod rag;
pub mod retrieve;
pub mod services;

#[cfg(test)]
mod test_support;
