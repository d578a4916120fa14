//! Prompts for the LLM backend.
//!
//! The system prompts are fixed so providers can cache them. Everything
//! that varies per field or per slot goes into the instruction built by
//! [`field_instruction`] or [`synthesis_instruction`].

use distill_core::{FieldKind, FieldSpec, GenerationRule};

/// System prompt for field extraction.
pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"
You extract one piece of information from a document.

Work step by step:
1. Find the passages of the document relevant to the question
2. Decide the answer using only what the document says
3. Check the answer against the stated constraints
4. Copy numbers, dates, durations and names exactly as written

Never guess. If the document does not say, answer with an empty value.

Respond with a single JSON object and nothing else:
{
  "reasoning": "how you found the answer",
  "value": "the answer",
  "evidence": "a short passage copied verbatim from the document"
}
"#;

/// System prompt for rewriting a generated phrase.
pub const SYNTHESIS_SYSTEM_PROMPT: &str = r#"
You polish one sentence of a plain-language document summary.

Rules:
1. Keep the meaning of the draft exactly
2. Keep every quoted fact character for character
3. Do not add information that is not in the draft
4. Write at a plain reading level, in one or two sentences

Respond with a single JSON object and nothing else:
{
  "reasoning": "what you changed and why",
  "value": "the rewritten text"
}
"#;

fn describe_constraints(spec: &FieldSpec) -> Vec<String> {
    let mut lines = Vec::new();
    match spec.kind {
        FieldKind::Boolean => lines.push("Answer \"true\" or \"false\".".to_string()),
        FieldKind::Numeric => lines.push("Answer with a single number, digits only.".to_string()),
        FieldKind::Enumeration => lines.push(format!(
            "Answer with exactly one of: {}.",
            spec.constraints
                .allowed_values
                .iter()
                .map(|v| format!("\"{}\"", v))
                .collect::<Vec<_>>()
                .join(", ")
        )),
        FieldKind::ShortText | FieldKind::LongText => {}
    }
    if let Some(max) = spec.max_words() {
        lines.push(format!("Use at most {} words.", max));
    }
    if let Some(max) = spec.constraints.max_length {
        lines.push(format!("Use at most {} characters.", max));
    }
    if spec.critical {
        lines.push("Quote the value exactly as it appears in the document.".to_string());
    }
    lines
}

/// Build the per-field question.
///
/// `previous_rejection` switches to the stricter retry form, which
/// repeats why the last answer was refused.
pub fn field_instruction(spec: &FieldSpec, previous_rejection: Option<&str>) -> String {
    let mut out = format!("Field: {}\nQuestion: {}\n", spec.name, spec.extraction_prompt.trim());

    let constraints = describe_constraints(spec);
    if !constraints.is_empty() {
        out.push_str("\nConstraints:\n");
        for line in constraints {
            out.push_str("- ");
            out.push_str(&line);
            out.push('\n');
        }
    }

    if let Some(reason) = previous_rejection {
        out.push_str(&format!(
            "\nYour previous answer was rejected: {}\n\
             Answer again, following every constraint exactly. \
             Return only the JSON object.\n",
            reason
        ));
    }
    out
}

/// Build the rewrite request for one slot.
///
/// `keep` lists values that must survive the rewrite unchanged.
pub fn synthesis_instruction(rule: &GenerationRule, draft: &str, keep: &[String]) -> String {
    let mut out = format!("Slot: {}\nDraft: {}\n", rule.slot, draft);
    if let Some(guidance) = &rule.guidance {
        out.push_str(&format!("Guidance: {}\n", guidance.trim()));
    }
    if !keep.is_empty() {
        out.push_str("\nKeep these exactly as written:\n");
        for value in keep {
            out.push_str(&format!("- \"{}\"\n", value));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_instruction_lists_choices() {
        let spec = FieldSpec::new("study_type", FieldKind::Enumeration, "What kind of study?")
            .with_allowed_values(["studying", "collecting"]);
        let instruction = field_instruction(&spec, None);
        assert!(instruction.contains("Question: What kind of study?"));
        assert!(instruction.contains("\"studying\", \"collecting\""));
        assert!(!instruction.contains("rejected"));
    }

    #[test]
    fn test_retry_instruction_is_stricter() {
        let spec = FieldSpec::new("study_duration", FieldKind::ShortText, "How long?")
            .critical()
            .with_max_words(5);
        let instruction = field_instruction(&spec, Some("too many words"));
        assert!(instruction.contains("Use at most 5 words."));
        assert!(instruction.contains("exactly as it appears"));
        assert!(instruction.contains("rejected: too many words"));
    }

    #[test]
    fn test_synthesis_instruction_lists_kept_values() {
        let rule = GenerationRule::new("duration", "The study lasts {study_duration}.")
            .with_guidance("Address the reader as 'you'.");
        let instruction = synthesis_instruction(
            &rule,
            "The study lasts 12 weeks.",
            &["12 weeks".to_string()],
        );
        assert!(instruction.contains("Draft: The study lasts 12 weeks."));
        assert!(instruction.contains("Guidance: Address the reader"));
        assert!(instruction.contains("- \"12 weeks\""));
    }
}
