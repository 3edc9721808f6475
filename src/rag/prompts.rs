//! Prompt templates

/// Returned whenever no grounded answer can be produced
pub const FALLBACK_ANSWER: &str = "I couldn't find relevant content in this course's materials \
to answer that question. Try rephrasing it, or check that the course materials have finished processing.";

/// System context: instructions plus the retrieved excerpts
pub fn system_context(excerpts: &str) -> String {
    format!(
        "You are a teaching assistant answering questions about course materials.\n\
         Answer using only the excerpts below. If they do not contain the answer, say so.\n\
         Cite excerpts by their bracketed number, e.g. [1].\n\n\
         Course material excerpts:\n{}",
        excerpts
    )
}

/// User prompt: recent conversation, then the question
pub fn answer_prompt(question: &str, history: &str) -> String {
    if history.is_empty() {
        format!("Question: {}", question.trim())
    } else {
        format!(
            "Conversation so far:\n{}\n\nQuestion: {}",
            history,
            question.trim()
        )
    }
}

pub fn follow_up_prompt(question: &str, answer: &str, count: usize) -> String {
    format!(
        "A student asked: {}\nThe answer was: {}\n\n\
         Suggest {} short follow-up questions the student could ask next about the same material. \
         Write one question per line and nothing else.",
        question.trim(),
        answer.trim(),
        count
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_prompt_with_and_without_history() {
        assert_eq!(answer_prompt(" What is ATP? ", ""), "Question: What is ATP?");

        let prompt = answer_prompt("And its role?", "Student: What is ATP?\nTutor: An energy carrier.");
        assert!(prompt.starts_with("Conversation so far:\nStudent: What is ATP?"));
        assert!(prompt.ends_with("Question: And its role?"));
    }

    #[test]
    fn test_system_context_embeds_excerpts() {
        let ctx = system_context("[1] Notes (page 2)\nMitochondria make ATP.");
        assert!(ctx.ends_with("[1] Notes (page 2)\nMitochondria make ATP."));
    }
}
