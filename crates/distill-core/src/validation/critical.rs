//! Critical value layer: verbatim preservation.
//!
//! A critical field with no value has nothing to preserve, which is
//! itself a blocking issue: it counts as missing whatever the
//! preservation target. Boolean fields are never checked.

use super::report::{CriticalValueMissing, IssueCode, ReportBuilder};
use super::ValidationInput;
use crate::schema::FieldKind;
use std::collections::BTreeSet;

pub(crate) fn check(input: &ValidationInput<'_>, report: &mut ReportBuilder) {
    let extracted = input.context.extracted();

    let mut empty_fields: BTreeSet<&str> = input
        .schema
        .fields()
        .iter()
        .filter(|spec| spec.critical && spec.kind != FieldKind::Boolean)
        .filter(|spec| extracted.get(&spec.name).map_or(true, |v| v.value().is_empty()))
        .map(|spec| spec.name.as_str())
        .collect();

    let mut blank_unnamed = 0usize;
    let mut declared = Vec::new();
    for value in input.critical_values {
        if !value.value.trim().is_empty() {
            declared.push(value);
            continue;
        }
        match &value.field {
            Some(field) => {
                empty_fields.insert(field.as_str());
            }
            None => blank_unnamed += 1,
        }
    }

    let total = declared.len() + empty_fields.len() + blank_unnamed;
    if total == 0 {
        report.metrics.critical_value_preservation_rate = 100.0;
        report.info("No critical values declared");
        return;
    }

    // Exact, case-sensitive substring search
    let missing: Vec<CriticalValueMissing> = declared
        .iter()
        .filter(|c| !input.rendered.contains(c.value.as_str()))
        .map(|c| CriticalValueMissing::from(*c))
        .collect();

    let found = declared.len() - missing.len();
    let rate = found as f64 / total as f64 * 100.0;
    report.metrics.critical_value_preservation_rate = rate;

    for field in &empty_fields {
        tracing::warn!(field = %field, "Critical field resolved to an empty value");
        report.issue(
            IssueCode::CriticalValueMissing,
            format!("Critical field '{}' has no value to preserve", field),
        );
    }
    if blank_unnamed > 0 {
        report.issue(
            IssueCode::CriticalValueMissing,
            format!("{} declared critical value(s) are blank", blank_unnamed),
        );
    }

    let blocking = rate < input.config.preservation_target;
    for miss in missing {
        if blocking {
            report.issue(IssueCode::CriticalValueMissing, miss.to_string());
        } else {
            report.warning(miss.to_string());
        }
    }
}
