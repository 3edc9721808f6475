//! Follow-up question suggestions
//!
//! Model suggestions are cleaned and filtered; heuristic questions built
//! from the cited materials top the list up to at least two. A reply never
//! carries more than four.

use super::prompts::follow_up_prompt;
use super::SourceDocument;
use crate::config::QueryConfig;
use crate::provider::ModelProvider;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

const MIN_FOLLOW_UPS: usize = 2;
const MAX_FOLLOW_UPS: usize = 4;

fn list_marker() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*•]+|\(?\d+[.):]|[Qq]\d*[.:])\s*").ok())
        .as_ref()
}

/// Extract questions from a model reply, one per line
pub fn parse_follow_ups(text: &str, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut questions = Vec::new();

    for line in text.lines() {
        let line = match list_marker() {
            Some(re) => re.replace(line, "").into_owned(),
            None => line.to_string(),
        };
        let question = line.trim().trim_matches('"').trim();
        if question.len() < 3 || !question.ends_with('?') {
            continue;
        }
        if seen.insert(question.to_lowercase()) {
            questions.push(question.to_string());
        }
        if questions.len() >= max {
            break;
        }
    }
    questions
}

/// Questions derived from cited materials, most relevant source first
pub fn heuristic_follow_ups(sources: &[SourceDocument]) -> Vec<String> {
    let mut questions = Vec::new();
    for source in sources {
        match source.page_number {
            Some(page) => questions.push(format!(
                "What else does \"{}\" explain on page {}?",
                source.material_title, page
            )),
            None => questions.push(format!(
                "What else does \"{}\" explain?",
                source.material_title
            )),
        }
        questions.push(format!(
            "Can you summarize the key points of \"{}\"?",
            source.material_title
        ));
    }
    questions.push("Can you explain that in simpler terms?".to_string());
    questions.push("Can you give an example of this?".to_string());
    questions
}

/// Pad `questions` with heuristics until it has at least two entries
pub fn fill_with_heuristics(questions: &mut Vec<String>, sources: &[SourceDocument]) {
    let mut seen: HashSet<String> = questions.iter().map(|q| q.to_lowercase()).collect();

    for candidate in heuristic_follow_ups(sources) {
        if questions.len() >= MIN_FOLLOW_UPS {
            break;
        }
        if seen.insert(candidate.to_lowercase()) {
            questions.push(candidate);
        }
    }
}

pub async fn suggest_follow_ups(
    provider: &dyn ModelProvider,
    question: &str,
    answer: &str,
    excerpts: &str,
    sources: &[SourceDocument],
    config: &QueryConfig,
) -> Vec<String> {
    let max = config.max_follow_ups.clamp(MIN_FOLLOW_UPS, MAX_FOLLOW_UPS);
    let mut questions = Vec::new();

    if config.model_follow_ups {
        let prompt = follow_up_prompt(question, answer, max);
        match provider.generate(&prompt, excerpts).await {
            Ok(reply) => {
                questions = parse_follow_ups(&reply, max);
                debug!(count = questions.len(), "Model suggested follow-ups");
            }
            Err(e) => warn!(error = %e, "Follow-up generation failed, using heuristics"),
        }
    }

    fill_with_heuristics(&mut questions, sources);
    questions
}
