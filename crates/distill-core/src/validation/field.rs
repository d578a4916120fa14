//! Field layer: required fields present, constraints still hold, and
//! cross-field rules agree with each other.

use super::report::{IssueCode, ReportBuilder};
use super::ValidationInput;
use crate::value::ValueSource;

pub(crate) fn check(input: &ValidationInput<'_>, report: &mut ReportBuilder) {
    let extracted = input.context.extracted();

    for spec in input.schema.fields() {
        let Some(value) = extracted.get(&spec.name) else {
            if spec.required {
                report.issue(
                    IssueCode::MissingRequiredField,
                    format!("Required field missing: {}", spec.name),
                );
            }
            continue;
        };

        if spec.required && value.value().is_empty() {
            report.issue(
                IssueCode::MissingRequiredField,
                format!("Required field is empty: {}", spec.name),
            );
        }

        if let Err(e) = spec.check(value.value()) {
            report.issue(IssueCode::ConstraintViolation, e.to_string());
        }

        if value.source() == ValueSource::Fallback {
            report.warning(format!(
                "Field '{}' was resolved without the intelligent backend: {}",
                spec.name,
                value.rationale()
            ));
        }
    }

    let unknown: Vec<&str> = extracted
        .keys()
        .filter(|name| input.schema.get(name).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        report.info(format!(
            "Values present for fields not in the schema: {}",
            unknown.join(", ")
        ));
    }

    for rule in &input.config.cross_field_rules {
        if !rule.when.evaluate(extracted).result {
            continue;
        }
        let text = rule
            .fields
            .iter()
            .filter_map(|name| extracted.get(name))
            .map(|v| v.value().render())
            .collect::<Vec<_>>()
            .join(" ");
        if !rule.is_satisfied_by(&text) {
            tracing::debug!(rule = %rule.name, "Cross-field rule not satisfied");
            report.warning(rule.describe());
        }
    }
}
