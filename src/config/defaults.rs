//! Default values for configuration

/// Default OpenAI-compatible provider URL (local Ollama)
pub fn default_provider_base_url() -> String {
    std::env::var("LECTERN_PROVIDER_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:11434/v1".to_string())
}

/// Default environment variable name for the provider API key
pub fn default_provider_api_key_env() -> String {
    "LECTERN_API_KEY".to_string()
}

pub fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

pub fn default_chat_model() -> String {
    "llama3.1".to_string()
}

/// Default embedding dimension (nomic-embed-text)
pub fn default_embedding_dimension() -> usize {
    768
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default provider request timeout in seconds
pub fn default_provider_timeout() -> u64 {
    60
}

/// Retry-After used when a 429 carries no usable header
pub fn default_retry_after_secs() -> u64 {
    30
}

/// Provider requests per second (0 = unlimited)
pub fn default_requests_per_second() -> u32 {
    0
}

pub fn default_temperature() -> f32 {
    0.3
}

pub fn default_max_tokens() -> u32 {
    800
}

/// Default maximum characters per chunk
pub fn default_chunk_max_chars() -> usize {
    1000
}

/// Default overlap characters between chunks
pub fn default_chunk_overlap() -> usize {
    200
}

/// Default look-back window for break points
pub fn default_chunk_boundary_window() -> usize {
    200
}

/// Default minimum characters per chunk
pub fn default_chunk_min_chars() -> usize {
    1
}

/// Default attempts before a job is marked failed
pub fn default_queue_max_attempts() -> u32 {
    3
}

/// Default worker poll interval (milliseconds)
pub fn default_queue_poll_interval_ms() -> u64 {
    2000
}

/// Default lease duration for a claimed job
pub fn default_queue_lease_secs() -> u64 {
    600
}

/// Default lease renewal interval
pub fn default_queue_heartbeat_secs() -> u64 {
    60
}

pub fn default_queue_backoff_base_secs() -> u64 {
    5
}

pub fn default_queue_backoff_max_secs() -> u64 {
    600
}

/// Default fetch timeout in seconds
pub fn default_fetch_timeout() -> u64 {
    60
}

/// Default maximum document size (50 MiB)
pub fn default_fetch_max_bytes() -> usize {
    50 * 1024 * 1024
}

/// Default user agent
pub fn default_fetch_user_agent() -> String {
    format!("lectern/{}", env!("CARGO_PKG_VERSION"))
}

/// Default number of retrieved chunks
pub fn default_query_top_k() -> usize {
    5
}

/// Default context budget (characters)
pub fn default_query_max_context_chars() -> usize {
    6000
}

/// Default number of prior turns folded into the prompt
pub fn default_query_history_turns() -> usize {
    3
}

pub fn default_query_max_history_chars() -> usize {
    1500
}

pub fn default_query_model_follow_ups() -> bool {
    true
}

pub fn default_query_max_follow_ups() -> usize {
    4
}

pub fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

pub fn default_server_port() -> u16 {
    8080
}

pub fn default_server_run_worker() -> bool {
    true
}
