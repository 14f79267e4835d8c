//! Prompt construction for grounded generation.
//!
//! Everything here is pure: the same question, evidence and mode always
//! produce the same prompt.

use serde::{Deserialize, Serialize};

use crate::document::EvidenceSet;

/// Separator between evidence chunks in a prompt.
pub const EVIDENCE_SEPARATOR: &str = "\n\n---\n\n";

/// The literal reply the model must give when the evidence lacks the answer.
pub const REFUSAL: &str = "I don't know";

/// Which kind of output a generation call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// One word or a two-to-three word phrase.
    Short,
    /// A warm, child-friendly retelling that quotes the evidence.
    Explain,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::Short => "short",
            GenerationMode::Explain => "explain",
        }
    }
}

const SHORT_SYSTEM: &str = "You are Chess Buddy, a friendly chess teacher for children aged 5 to 10. \
You answer questions about the Chessland stories using only the story evidence you are given.";

const EXPLAIN_SYSTEM: &str = "You are Chess Buddy, retelling a real moment from the Chessland stories \
to a child. You mention who said what, quote their actual lines, and never add anything that is not \
in the story evidence you are given.";

/// System instruction for `mode`.
pub fn system_instruction(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::Short => SHORT_SYSTEM,
        GenerationMode::Explain => EXPLAIN_SYSTEM,
    }
}

/// Evidence chunks labelled with their source, in rank order.
pub fn format_evidence(evidence: &EvidenceSet) -> String {
    evidence
        .iter()
        .map(|e| format!("[Source: {}]\n{}", e.source_id, e.text.trim()))
        .collect::<Vec<_>>()
        .join(EVIDENCE_SEPARATOR)
}

/// Build the user prompt for one generation call.
///
/// The prompt names the evidence as the only permissible source, requires
/// the literal refusal [`REFUSAL`] when the evidence does not contain the
/// answer, and forbids introducing entities, events or rules.
pub fn build_prompt(question: &str, evidence: &EvidenceSet, mode: GenerationMode) -> String {
    let evidence = format_evidence(evidence);
    let question = question.trim();
    match mode {
        GenerationMode::Short => format!(
            "Story Evidence (the ONLY source you may use):\n\
             {evidence}\n\n\
             Child's Question: {question}\n\n\
             RULES:\n\
             1. Answer ONLY from the Story Evidence above.\n\
             2. Reply with ONE word or a very short phrase of 2-3 words. No explanation, no punctuation.\n\
             3. Do NOT add any character, event, piece or rule that is not in the Story Evidence.\n\
             4. If the Story Evidence does not contain the answer, reply exactly: {REFUSAL}\n\n\
             SHORT ANSWER:"
        ),
        GenerationMode::Explain => format!(
            "Story Evidence (the ONLY source you may use):\n\
             {evidence}\n\n\
             Child's Question: {question}\n\n\
             RULES:\n\
             1. Explain the answer ONLY from the Story Evidence above.\n\
             2. Quote the exact sentences that give the answer, in quotation marks, and say who said them.\n\
             3. Do NOT invent dialogue, characters, events or chess rules that are not in the Story Evidence.\n\
             4. Be warm and simple, like retelling the story to a young child, in 3 to 6 sentences.\n\
             5. If the Story Evidence does not contain the answer, reply exactly: {REFUSAL}\n\n\
             EXPLANATION:"
        ),
    }
}
