//! Content quality layer: leaked boilerplate, placeholders, sentence shape.

use super::report::{IssueCode, ReportBuilder};
use super::ValidationInput;
use crate::text;

pub(crate) fn check(input: &ValidationInput<'_>, report: &mut ReportBuilder) {
    let rendered = input.rendered;
    if rendered.trim().is_empty() {
        report.warning("Rendered output is empty");
    }

    let lowered = rendered.to_lowercase();
    for phrase in &input.config.denylist {
        if !phrase.is_empty() && lowered.contains(&phrase.to_lowercase()) {
            report.issue(
                IssueCode::ProhibitedPhrase,
                format!("Prohibited phrase found: '{}'", phrase),
            );
        }
    }

    for pattern in &input.patterns.denylist {
        if let Some(found) = pattern.find(rendered) {
            report.issue(
                IssueCode::ArtifactPattern,
                format!("Placeholder or template artifact found: '{}'", found.as_str()),
            );
        }
    }

    let sentences = text::sentences(rendered);
    let lengths: Vec<usize> = sentences.iter().map(|s| text::word_count(s)).collect();
    let word_count = text::word_count(rendered);

    report.metrics.word_count = word_count;
    report.metrics.sentence_count = sentences.len();
    report.metrics.average_sentence_length = if lengths.is_empty() {
        0.0
    } else {
        lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
    };

    let min = input.config.min_sentence_words;
    let max = input.config.max_sentence_words;
    let fragments = lengths.iter().filter(|&&n| n < min).count();
    let run_ons = lengths.iter().filter(|&&n| n > max).count();

    if fragments > 0 {
        report.warning(format!(
            "{} sentence fragment(s) shorter than {} words",
            fragments, min
        ));
    }
    if run_ons > 0 {
        report.warning(format!("{} sentence(s) longer than {} words", run_ons, max));
    }
}
