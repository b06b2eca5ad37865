use super::index::QueryResult;
use crate::llm::types::ChatMessage;

pub const SECTION_SEPARATOR: &str = "\n\n================\n\n";

pub const SYSTEM_PROMPT: &str = "You are a helpful documentation assistant. Answer strictly from the provided context. If the answer is not in the context, say you don't know and suggest where to look.";

pub fn render_section(result: &QueryResult) -> String {
    format!(
        "File: {}\nScore: {:.3}\n----\n{}",
        result.chunk.path, result.score, result.chunk.text
    )
}

/// Joins sections best-first until the next one would exceed `max_chars`.
/// The first section is always kept so an oversized chunk still grounds
/// the answer.
pub fn build_context(results: &[QueryResult], max_chars: usize) -> String {
    let separator_len = SECTION_SEPARATOR.chars().count();
    let mut context = String::new();
    let mut used = 0usize;

    for (position, result) in results.iter().enumerate() {
        let section = render_section(result);
        let section_len = section.chars().count();
        if position == 0 {
            used = section_len;
            context = section;
            continue;
        }
        if used + separator_len + section_len > max_chars {
            tracing::debug!(
                "Context budget reached after {} of {} sections",
                position,
                results.len()
            );
            break;
        }
        context.push_str(SECTION_SEPARATOR);
        context.push_str(&section);
        used += separator_len + section_len;
    }

    context
}

pub fn build_messages(question: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Question: {}\n\nContext:\n{}", question, context)),
    ]
}
