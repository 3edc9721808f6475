//! Query command implementation

use crate::error::{Error, Result};
use crate::rag::{ChatTurn, CourseStats, QueryEngine, QueryResponse};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub course_id: Option<String>,
    pub history: Vec<ChatTurn>,
}

/// Read prior turns from a JSON file: `[{"question": ..., "answer": ...}]`
pub fn load_history(path: &Path) -> Result<Vec<ChatTurn>> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|e| {
        Error::Other(format!(
            "Invalid chat history in {}: {}",
            path.display(),
            e
        ))
    })
}

/// Answer a question against the course materials
pub async fn cmd_query(engine: &QueryEngine, question: &str, options: QueryOptions) -> Result<QueryResponse> {
    if question.trim().is_empty() {
        return Err(Error::Other("Question must not be empty".to_string()));
    }
    info!(
        course_id = options.course_id.as_deref().unwrap_or("*"),
        history_turns = options.history.len(),
        "Running query"
    );

    Ok(engine
        .query_with_history(question, &options.history, options.course_id.as_deref())
        .await)
}

/// Print a query response to console
pub fn print_query_response(response: &QueryResponse) {
    println!("\n{}\n", response.answer);

    if response.source_documents.is_empty() {
        return;
    }

    println!("Sources:");
    for (i, source) in response.source_documents.iter().enumerate() {
        let page = source
            .page_number
            .map(|p| format!(", page {}", p))
            .unwrap_or_default();
        println!(
            "  [{}] {}{} (score: {:.3})",
            i + 1,
            source.material_title,
            page,
            source.score
        );
    }

    if !response.follow_up_questions.is_empty() {
        println!("\nYou might also ask:");
        for question in &response.follow_up_questions {
            println!("  • {}", question);
        }
    }
}

pub fn print_course_stats(stats: &CourseStats) {
    match &stats.course_id {
        Some(course) => println!("\n📚 Course {}\n", course),
        None => println!("\n📚 All courses\n"),
    }
    println!("  Materials: {}", stats.total_materials);
    println!("  Processed: {}", stats.processed_materials);
    println!("  Chunks: {}", stats.total_chunks);
    println!(
        "  Avg chunks per material: {:.1}",
        stats.average_chunks_per_material
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_history() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("history.json");
        std::fs::write(
            &path,
            r#"[{"question": "What is ATP?", "answer": "An energy carrier."}]"#,
        )
        .unwrap();

        let history = load_history(&path).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "What is ATP?");

        std::fs::write(&path, "  \n").unwrap();
        assert!(load_history(&path).unwrap().is_empty());

        std::fs::write(&path, "{not json").unwrap();
        let err = load_history(&path).unwrap_err().to_string();
        assert!(err.contains("Invalid chat history"));
    }

    #[test]
    fn test_load_history_missing_file() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            load_history(&tmp.path().join("nope.json")),
            Err(Error::Io(_))
        ));
    }
}
