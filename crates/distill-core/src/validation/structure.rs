//! Structural layer: section count, fingerprint and cross-run consistency.

use super::report::{IssueCode, ReportBuilder};
use super::ValidationInput;
use crate::consistency::{self, RunSample};
use crate::text;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BLANK_LINES: Regex = Regex::new(r"\n[ \t]*\n").unwrap();
}

/// Split rendered text into sections.
///
/// Each heading match starts a section that runs to the next heading.
/// Text before the first heading is not a section. Without any heading,
/// blank-line separated blocks are the sections.
pub fn split_sections<'a>(rendered: &'a str, heading: &Regex) -> Vec<&'a str> {
    let starts: Vec<usize> = heading.find_iter(rendered).map(|m| m.start()).collect();

    if starts.is_empty() {
        return BLANK_LINES
            .split(rendered)
            .map(str::trim)
            .filter(|block| !block.is_empty())
            .collect();
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(rendered.len());
            rendered[start..end].trim()
        })
        .collect()
}

pub(crate) fn check(input: &ValidationInput<'_>, report: &mut ReportBuilder) {
    let sections = split_sections(input.rendered, &input.patterns.section_heading);
    let section_words: Vec<usize> = sections.iter().map(|s| text::word_count(s)).collect();
    let fingerprint = consistency::structural_fingerprint(&section_words);

    report.metrics.section_count = sections.len();
    report.metrics.structural_fingerprint = fingerprint.clone();

    if sections.len() != input.expected_section_count {
        report.issue(
            IssueCode::SectionCountMismatch,
            format!(
                "Expected {} sections, found {}",
                input.expected_section_count,
                sections.len()
            ),
        );
    }

    let key = input.context.tracker_key();
    let sample = RunSample::new(text::word_count(input.rendered), sections.len(), fingerprint);
    let window = input.tracker.record(&key, sample);
    let cv = consistency::coefficient_of_variation(&consistency::word_counts(&window));

    report.metrics.consistency_window = window.len();
    report.metrics.coefficient_of_variation = cv;

    if window.len() < 2 {
        report.info(format!(
            "Consistency window for {} has {} run(s); CV reported as 0",
            key,
            window.len()
        ));
    } else if cv > input.config.cv_target {
        tracing::warn!(key = %key, cv = cv, target = input.config.cv_target, "Output length is drifting");
        report.warning(format!(
            "Coefficient of variation {:.1}% exceeds target {:.1}% over {} runs",
            cv,
            input.config.cv_target,
            window.len()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::RegexBuilder;

    fn heading() -> Regex {
        RegexBuilder::new(r"^[ \t]*Section\s+\d+\b")
            .case_insensitive(true)
            .multi_line(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_sections_by_heading() {
        let text = "Preamble\nSection 1\nIntro text.\n  section 2\nRisks.\nSection 3\nEnd.";
        let sections = split_sections(text, &heading());
        assert_eq!(sections.len(), 3);
        assert!(sections[1].starts_with("section 2"));
    }

    #[test]
    fn test_heading_must_start_line() {
        let text = "See Section 2 for details.\n\nMore text.";
        // No heading at line start, so blank-line blocks are counted
        assert_eq!(split_sections(text, &heading()).len(), 2);
    }

    #[test]
    fn test_empty_text_has_no_sections() {
        assert!(split_sections("  \n\n ", &heading()).is_empty());
    }
}
