use std::fmt::Write as _;

use crate::index::ScoredRecord;
use crate::llm::Prompt;

pub const SYSTEM_INSTRUCTION: &str = "You answer questions about a single document. \
Use only the numbered context passages provided with the question. \
If the passages do not contain the answer, say that the document does not contain it. \
Do not make up an answer.";

/// Marker placed where passages would go when retrieval found nothing.
pub const EMPTY_CONTEXT: &str = "(no passages were retrieved from the document)";

/// Assemble the grounded prompt: numbered passages, then the question.
pub fn build_prompt(question: &str, passages: &[ScoredRecord]) -> Prompt {
    let mut user = String::from("Context:\n");
    if passages.is_empty() {
        user.push_str(EMPTY_CONTEXT);
        user.push('\n');
    }
    for (i, passage) in passages.iter().enumerate() {
        let _ = writeln!(
            user,
            "[{}] (page {}) {}",
            i + 1,
            passage.payload.page,
            passage.payload.text
        );
    }
    let _ = write!(user, "\nQuestion: {}\n\nAnswer:", question.trim());

    Prompt {
        system: SYSTEM_INSTRUCTION.to_string(),
        user,
    }
}
