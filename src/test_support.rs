//! Fakes shared by unit tests

use crate::config::Config;
use crate::error::{IngestError, ProviderError, ProviderResult};
use crate::fetch::BlobFetcher;
use crate::ingest::IngestionPipeline;
use crate::meta::{MaterialStatus, MetaDb, NewMaterial};
use crate::parse::DocumentExtractor;
use crate::provider::ModelProvider;
use crate::queue::CacheInvalidator;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const DEFAULT_ANSWER: &str = "Fake answer grounded in the course notes.";

pub fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.base_dir = tmp.path().to_path_buf();
    config.paths.config_file = tmp.path().join("config.toml");
    config.paths.db_file = tmp.path().join("metadata.db");
    config
}

pub async fn test_db() -> (MetaDb, TempDir) {
    let tmp = TempDir::new().unwrap();
    let db = MetaDb::new(&tmp.path().join("metadata.db")).await.unwrap();
    (db, tmp)
}

pub fn new_material(id: &str, course: &str) -> NewMaterial {
    NewMaterial {
        id: id.to_string(),
        title: format!("Lecture {id}"),
        file_url: format!("mem://{id}"),
        course_id: course.to_string(),
    }
}

/// Plain text document with form-feed separated pages
pub fn paged_document(pages: usize) -> Vec<u8> {
    (1..=pages)
        .map(|p| {
            format!(
                "Page {p} covers topic {p}. Photosynthesis converts light into chemical energy. \
                 Cells store that energy as glucose for later use."
            )
        })
        .collect::<Vec<_>>()
        .join("\x0c")
        .into_bytes()
}

pub fn pipeline(
    db: &MetaDb,
    config: &Config,
    fetcher: Arc<FakeFetcher>,
    provider: Arc<FakeProvider>,
) -> IngestionPipeline {
    IngestionPipeline::new(
        db.clone(),
        fetcher,
        Arc::new(DocumentExtractor::new()),
        provider,
        config,
    )
}

/// Scripted provider: deterministic embeddings, queued failures and answers
pub struct FakeProvider {
    dimension: usize,
    overrides: Mutex<HashMap<String, Vec<f32>>>,
    embed_errors: Mutex<VecDeque<ProviderError>>,
    answers: Mutex<VecDeque<ProviderResult<String>>>,
    prompts: Mutex<Vec<(String, String)>>,
    embed_calls: AtomicUsize,
    generate_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            overrides: Mutex::new(HashMap::new()),
            embed_errors: Mutex::new(VecDeque::new()),
            answers: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            embed_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
        }
    }

    /// Pin the embedding returned for an exact text
    pub fn set_vector(&self, text: &str, vector: Vec<f32>) {
        self.overrides
            .lock()
            .unwrap()
            .insert(text.to_string(), vector);
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.overrides.lock().unwrap().get(text) {
            return v.clone();
        }
        let hash = blake3::hash(text.as_bytes());
        let bytes = hash.as_bytes();
        (0..self.dimension)
            .map(|i| bytes[i % bytes.len()] as f32 / 255.0 + 0.01)
            .collect()
    }

    /// The next embed calls fail with these errors, in order
    pub fn fail_embeds_with(&self, errors: Vec<ProviderError>) {
        self.embed_errors.lock().unwrap().extend(errors);
    }

    /// The next generate calls return these results, in order
    pub fn script_answers(&self, answers: Vec<ProviderResult<String>>) {
        self.answers.lock().unwrap().extend(answers);
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    /// `(prompt, context)` pairs seen by `generate`
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for FakeProvider {
    async fn embed(&self, texts: Vec<String>) -> ProviderResult<Vec<Vec<f32>>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.embed_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    async fn generate(&self, prompt: &str, context: &str) -> ProviderResult<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), context.to_string()));
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_ANSWER.to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// In-memory documents keyed by URL
#[derive(Default)]
pub struct FakeFetcher {
    documents: Mutex<HashMap<String, Result<Vec<u8>, String>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(bytes));
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(message.to_string()));
    }

    /// Every fetch sleeps this long before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobFetcher for FakeFetcher {
    async fn fetch(&self, file_url: &str) -> Result<Vec<u8>, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.documents.lock().unwrap().get(file_url) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(message)) => Err(IngestError::Fetch(message.clone())),
            None => Err(IngestError::Fetch(format!("HTTP 404 Not Found: {file_url}"))),
        }
    }
}

/// Records every status change it is told about
#[derive(Default)]
pub struct RecordingInvalidator {
    events: Mutex<Vec<(String, MaterialStatus)>>,
}

impl RecordingInvalidator {
    pub fn events(&self) -> Vec<(String, MaterialStatus)> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses_for(&self, material_id: &str) -> Vec<MaterialStatus> {
        self.events()
            .into_iter()
            .filter(|(id, _)| id == material_id)
            .map(|(_, status)| status)
            .collect()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn material_status_changed(&self, material_id: &str, status: MaterialStatus) {
        self.events
            .lock()
            .unwrap()
            .push((material_id.to_string(), status));
    }
}
