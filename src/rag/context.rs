//! Context window assembly
//!
//! Retrieved content outranks conversation history. Chunks are added most
//! relevant first until the next would overflow `max_context_chars`; history
//! gets whatever is left, capped at `max_history_chars`, keeping the newest
//! turns.

use super::ChatTurn;
use crate::config::QueryConfig;
use crate::retrieve::RetrievedChunk;

const CHUNK_SEPARATOR: &str = "\n\n";

/// The bounded material handed to the model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledContext {
    /// Rendered excerpts, most relevant first
    pub excerpts: String,
    /// Number of leading retrieved chunks that made it into `excerpts`
    pub chunks_used: usize,
    /// Rendered history, oldest turn first
    pub history: String,
    pub turns_used: usize,
}

pub fn assemble_context(
    chunks: &[RetrievedChunk],
    history: &[ChatTurn],
    config: &QueryConfig,
) -> AssembledContext {
    let budget = config.max_context_chars;
    let (excerpts, chunks_used) = pack_chunks(chunks, budget);

    let remaining = budget.saturating_sub(excerpts.chars().count());
    let history_budget = config.max_history_chars.min(remaining);
    let (history, turns_used) = pack_history(history, config.history_turns, history_budget);

    AssembledContext {
        excerpts,
        chunks_used,
        history,
        turns_used,
    }
}

fn render_chunk(position: usize, chunk: &RetrievedChunk) -> String {
    match chunk.page_number {
        Some(page) => format!(
            "[{}] {} (page {})\n{}",
            position, chunk.material_title, page, chunk.content
        ),
        None => format!("[{}] {}\n{}", position, chunk.material_title, chunk.content),
    }
}

fn pack_chunks(chunks: &[RetrievedChunk], budget: usize) -> (String, usize) {
    let mut out = String::new();
    let mut used_chars = 0;
    let mut used = 0;

    for (i, chunk) in chunks.iter().enumerate() {
        let block = render_chunk(i + 1, chunk);
        let separator = if used == 0 { 0 } else { CHUNK_SEPARATOR.len() };
        let block_chars = block.chars().count();

        if used_chars + separator + block_chars > budget {
            if used == 0 && budget > 0 {
                out = truncate_chars(&block, budget);
                used = 1;
            }
            break;
        }

        if separator > 0 {
            out.push_str(CHUNK_SEPARATOR);
        }
        out.push_str(&block);
        used_chars += separator + block_chars;
        used += 1;
    }

    (out, used)
}

fn render_turn(turn: &ChatTurn) -> String {
    format!(
        "Student: {}\nTutor: {}",
        turn.question.trim(),
        turn.answer.trim()
    )
}

fn pack_history(history: &[ChatTurn], max_turns: usize, budget: usize) -> (String, usize) {
    let recent = &history[history.len().saturating_sub(max_turns)..];
    let rendered: Vec<String> = recent.iter().map(render_turn).collect();

    // Drop oldest turns until the rest fits
    for start in 0..rendered.len() {
        let kept = &rendered[start..];
        let chars: usize = kept.iter().map(|t| t.chars().count()).sum::<usize>()
            + CHUNK_SEPARATOR.len() * kept.len().saturating_sub(1);
        if chars <= budget {
            return (kept.join(CHUNK_SEPARATOR), kept.len());
        }
    }
    (String::new(), 0)
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
