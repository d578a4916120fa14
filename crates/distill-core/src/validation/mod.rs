//! Validation orchestrator.
//!
//! Runs four independent layers against a finished request and merges
//! their findings into one [`ValidationReport`]:
//!
//! 1. **Field**: required fields present, constraints hold, cross-field
//!    rules agree
//! 2. **Content quality**: denylisted phrases, placeholders, sentence shape
//! 3. **Structural**: section count, fingerprint, cross-run CV
//! 4. **Critical values**: verbatim preservation
//!
//! # Isolation Contract
//!
//! Layers do not see each other's findings. All four always run, in this
//! order, and the report passes iff no layer raised an issue. Warnings
//! and info notes never block.
//!
//! Validation is synchronous. The structural layer appends to the shared
//! [`ConsistencyTracker`]; because there is no suspension point inside
//! `validate`, a cancelled request can never leave a partial append.

mod config;
mod content;
mod critical;
mod field;
mod report;
mod structure;

pub use config::{
    ConfigError, CrossFieldRule, ValidationConfig, DEFAULT_DENYLIST, DEFAULT_DENYLIST_PATTERNS,
    DEFAULT_SECTION_HEADING,
};
pub use report::{
    CriticalValueMissing, IssueCode, LayerKind, LayerOutcome, ReportMetrics, ValidationIssue,
    ValidationNote, ValidationReport,
};
pub use structure::split_sections;

use crate::consistency::ConsistencyTracker;
use crate::context::{CriticalValue, GenerationContext};
use crate::schema::FieldSchema;
use config::CompiledPatterns;
use report::ReportBuilder;
use std::sync::Arc;

/// Everything a layer may look at.
pub(crate) struct ValidationInput<'a> {
    pub schema: &'a FieldSchema,
    pub config: &'a ValidationConfig,
    pub patterns: &'a CompiledPatterns,
    pub tracker: &'a ConsistencyTracker,
    pub context: &'a GenerationContext,
    pub rendered: &'a str,
    pub critical_values: &'a [CriticalValue],
    pub expected_section_count: usize,
}

/// Runs the four validation layers.
pub struct ValidationOrchestrator {
    schema: Arc<FieldSchema>,
    config: ValidationConfig,
    patterns: CompiledPatterns,
    tracker: Arc<ConsistencyTracker>,
}

impl ValidationOrchestrator {
    /// Create an orchestrator that records into the process-wide tracker.
    pub fn new(schema: Arc<FieldSchema>, config: ValidationConfig) -> Result<Self, ConfigError> {
        let patterns = config.compile()?;
        Ok(Self {
            schema,
            config,
            patterns,
            tracker: ConsistencyTracker::global(),
        })
    }

    /// Record into a specific tracker instead of the global one.
    pub fn with_tracker(mut self, tracker: Arc<ConsistencyTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &Arc<ConsistencyTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Validate a finished request.
    ///
    /// A context without rendered text is validated as the empty string.
    pub fn validate(
        &self,
        context: &GenerationContext,
        critical_values: &[CriticalValue],
        expected_section_count: usize,
    ) -> ValidationReport {
        let input = ValidationInput {
            schema: &self.schema,
            config: &self.config,
            patterns: &self.patterns,
            tracker: &self.tracker,
            context,
            rendered: context.rendered().unwrap_or_default(),
            critical_values,
            expected_section_count,
        };

        let mut builder = ReportBuilder::new();
        builder.run(LayerKind::Field, |b| field::check(&input, b));
        builder.run(LayerKind::ContentQuality, |b| content::check(&input, b));
        builder.run(LayerKind::Structural, |b| structure::check(&input, b));
        builder.run(LayerKind::CriticalValues, |b| critical::check(&input, b));
        let report = builder.finish();

        tracing::info!(
            document_type = %context.document_type(),
            template_id = %context.template_id(),
            passed = report.passed,
            issues = report.issues.len(),
            warnings = report.warnings.len(),
            preservation = report.metrics.critical_value_preservation_rate,
            cv = report.metrics.coefficient_of_variation,
            "Validation complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::TrackerKey;
    use crate::schema::{FieldKind, FieldSpec, PatternSpec};
    use crate::value::{ExtractedValue, ExtractedValues, FieldValue};

    fn schema() -> Arc<FieldSchema> {
        Arc::new(
            FieldSchema::new(vec![
                FieldSpec::new("study_duration", FieldKind::ShortText, "How long?")
                    .critical()
                    .required()
                    .with_max_length(50),
                FieldSpec::new("population", FieldKind::Enumeration, "Who?")
                    .with_allowed_values(["children", "adults"]),
            ])
            .unwrap(),
        )
    }

    fn orchestrator() -> ValidationOrchestrator {
        ValidationOrchestrator::new(schema(), ValidationConfig::default())
            .unwrap()
            .with_tracker(Arc::new(ConsistencyTracker::new(50)))
    }

    fn extracted(duration: &str) -> ExtractedValues {
        [
            ("study_duration", FieldValue::Text(duration.into())),
            ("population", FieldValue::Text("adults".into())),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), ExtractedValue::from_backend(k, v, "found", 1, vec![])))
        .collect()
    }

    fn context(rendered: &str) -> GenerationContext {
        let mut ctx = GenerationContext::new("source", "informed_consent", "short_form");
        ctx.set_extracted(extracted("12 weeks"));
        ctx.set_rendered(rendered);
        ctx
    }

    const GOOD: &str = "Section 1\nThis research study will last 12 weeks in total.\n\
                        Section 2\nThe main risks are headache and mild nausea.";

    #[test]
    fn test_preserved_value_passes() {
        let ctx = context(GOOD);
        let critical = [CriticalValue::for_field("study_duration", "12 weeks")];
        let report = orchestrator().validate(&ctx, &critical, 2);

        assert!(report.passed, "issues: {:?}", report.issues);
        assert_eq!(report.metrics.critical_value_preservation_rate, 100.0);
        assert_eq!(report.metrics.section_count, 2);
        assert_eq!(report.layers.len(), 4);
    }

    #[test]
    fn test_paraphrased_value_fails_naming_field() {
        let ctx = context(&GOOD.replace("12 weeks", "three months"));
        let critical = [CriticalValue::for_field("study_duration", "12 weeks")];
        let report = orchestrator().validate(&ctx, &critical, 2);

        assert!(!report.passed);
        assert_eq!(report.metrics.critical_value_preservation_rate, 0.0);
        let issue = report.issues_for(LayerKind::CriticalValues).next().unwrap();
        assert_eq!(issue.code, IssueCode::CriticalValueMissing);
        assert!(issue.message.contains("study_duration"));
        assert!(issue.message.contains("12 weeks"));
    }

    #[test]
    fn test_one_character_alteration_is_missing() {
        let ctx = context(&GOOD.replace("12 weeks", "12 Weeks"));
        let critical = [CriticalValue::new("12 weeks")];
        let report = orchestrator().validate(&ctx, &critical, 2);
        assert!(report.has_issue(IssueCode::CriticalValueMissing));
    }

    #[test]
    fn test_denylisted_phrase_fails() {
        let ctx = context(&format!("{}\nAs an AI language model, I summarized this.", GOOD));
        let report = orchestrator().validate(&ctx, &[], 2);

        assert!(!report.passed);
        let issue = report.issues_for(LayerKind::ContentQuality).next().unwrap();
        assert_eq!(issue.code, IssueCode::ProhibitedPhrase);
        assert!(issue.message.contains("As an AI"));
    }

    #[test]
    fn test_placeholder_artifact_fails() {
        let ctx = context(&GOOD.replace("headache", "{{ key_risks }}"));
        let report = orchestrator().validate(&ctx, &[], 2);
        assert!(report.has_issue(IssueCode::ArtifactPattern));
    }

    #[test]
    fn test_section_mismatch() {
        let ctx = context(GOOD);
        let report = orchestrator().validate(&ctx, &[], 3);
        assert!(report.has_issue(IssueCode::SectionCountMismatch));
    }

    #[test]
    fn test_no_critical_values_is_full_preservation() {
        let report = orchestrator().validate(&context(GOOD), &[], 2);
        assert_eq!(report.metrics.critical_value_preservation_rate, 100.0);
        assert!(report
            .info
            .iter()
            .any(|n| n.message.contains("No critical values declared")));
    }

    #[test]
    fn test_first_run_reports_cv_zero_with_info() {
        let report = orchestrator().validate(&context(GOOD), &[], 2);
        assert_eq!(report.metrics.coefficient_of_variation, 0.0);
        assert_eq!(report.metrics.consistency_window, 1);
        assert!(report
            .info
            .iter()
            .any(|n| n.layer == LayerKind::Structural && n.message.contains("CV reported as 0")));
    }

    #[test]
    fn test_cv_drift_warns_but_does_not_block() {
        let validator = orchestrator();
        let long = format!("{} {}", GOOD, "Participants will visit the clinic every week. ".repeat(10));
        validator.validate(&context(GOOD), &[], 2);
        let report = validator.validate(&context(&long), &[], 2);

        assert!(report.metrics.coefficient_of_variation > 15.0);
        assert!(report.warnings.iter().any(|w| w.layer == LayerKind::Structural));
        assert!(report.passed);
    }

    #[test]
    fn test_each_validation_appends_one_sample() {
        let validator = orchestrator();
        for _ in 0..3 {
            validator.validate(&context(GOOD), &[], 2);
        }
        let key = TrackerKey::new("informed_consent", "short_form");
        assert_eq!(validator.tracker().get_window(&key).len(), 3);
    }

    #[test]
    fn test_missing_required_field() {
        let mut ctx = context(GOOD);
        ctx.set_extracted(
            extracted("")
                .into_iter()
                .filter(|(k, _)| k != "study_duration")
                .collect(),
        );
        let report = orchestrator().validate(&ctx, &[], 2);
        let issue = report.issues_for(LayerKind::Field).next().unwrap();
        assert_eq!(issue.code, IssueCode::MissingRequiredField);
        assert!(issue.message.contains("study_duration"));
    }

    #[test]
    fn test_constraint_violation_post_synthesis() {
        let mut ctx = context(GOOD);
        let mut values = extracted("12 weeks");
        values.insert(
            "population".into(),
            ExtractedValue::from_backend("population", FieldValue::Text("elderly".into()), "x", 1, vec![]),
        );
        ctx.set_extracted(values);
        let report = orchestrator().validate(&ctx, &[], 2);
        assert!(report.has_issue(IssueCode::ConstraintViolation));
    }

    #[test]
    fn test_empty_rendered_text_still_runs_all_layers() {
        let mut ctx = GenerationContext::new("source", "informed_consent", "short_form");
        ctx.set_extracted(extracted("12 weeks"));
        let critical = [CriticalValue::for_field("study_duration", "12 weeks")];
        let report = orchestrator().validate(&ctx, &critical, 2);

        assert_eq!(report.layers.len(), 4);
        assert_eq!(report.metrics.word_count, 0);
        assert!(report.has_issue(IssueCode::CriticalValueMissing));
        assert!(report.has_issue(IssueCode::SectionCountMismatch));
    }

    #[test]
    fn test_relaxed_preservation_target_downgrades_to_warning() {
        let config = ValidationConfig {
            preservation_target: 50.0,
            ..Default::default()
        };
        let validator = ValidationOrchestrator::new(schema(), config)
            .unwrap()
            .with_tracker(Arc::new(ConsistencyTracker::new(5)));
        let critical = [
            CriticalValue::new("12 weeks"),
            CriticalValue::new("headache"),
            CriticalValue::new("a value that is absent"),
        ];
        let report = validator.validate(&context(GOOD), &critical, 2);

        assert!(report.passed);
        assert!((report.metrics.critical_value_preservation_rate - 200.0 / 3.0).abs() < 1e-9);
        assert!(report.warnings.iter().any(|w| w.layer == LayerKind::CriticalValues));
    }

    #[test]
    fn test_fallback_sourced_field_is_a_warning() {
        let mut ctx = context(GOOD);
        let mut values = extracted("12 weeks");
        values.insert(
            "population".into(),
            ExtractedValue::from_fallback(
                "population",
                FieldValue::Text("adults".into()),
                "deterministic pattern match: 'adults'",
                0,
                vec![],
            ),
        );
        ctx.set_extracted(values);
        let report = orchestrator().validate(&ctx, &[], 2);
        assert!(report.passed);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.layer == LayerKind::Field && w.message.contains("population")));
    }

    #[test]
    fn test_empty_critical_field_blocks() {
        let schema = Arc::new(
            FieldSchema::new(vec![FieldSpec::new(
                "study_duration",
                FieldKind::ShortText,
                "How long?",
            )
            .critical()
            .with_fallback(PatternSpec::new([r"lasts (\d+ weeks)"]).unwrap())])
            .unwrap(),
        );
        let document = "This document never states a duration.";
        let values = crate::extract_deterministic(document, &schema).unwrap();

        let mut ctx = GenerationContext::new(document, "informed_consent", "short_form");
        ctx.set_extracted(values);
        ctx.declare_critical_from(&schema);
        ctx.set_rendered("Section 1\nThe study lasts some time.");

        let validator = ValidationOrchestrator::new(schema, ValidationConfig::default())
            .unwrap()
            .with_tracker(Arc::new(ConsistencyTracker::new(5)));
        let report = validator.validate(&ctx, &ctx.critical_values(), 1);

        assert!(!report.passed);
        assert_eq!(report.metrics.critical_value_preservation_rate, 0.0);
        let issue = report.issues_for(LayerKind::CriticalValues).next().unwrap();
        assert_eq!(issue.code, IssueCode::CriticalValueMissing);
        assert!(issue.message.contains("study_duration"));
    }

    #[test]
    fn test_blank_declared_value_counts_as_missing() {
        let critical = [
            CriticalValue::new("12 weeks"),
            CriticalValue::for_field("key_risks", "  "),
        ];
        let report = orchestrator().validate(&context(GOOD), &critical, 2);

        assert!(!report.passed);
        assert_eq!(report.metrics.critical_value_preservation_rate, 50.0);
        assert!(report
            .issues_for(LayerKind::CriticalValues)
            .any(|i| i.message.contains("key_risks")));
    }

    fn pediatric_validator() -> ValidationOrchestrator {
        let config = ValidationConfig {
            cross_field_rules: vec![CrossFieldRule::new(
                "pediatric_consent",
                "is_pediatric",
                ["benefits_text"],
            )
            .unwrap()
            .mentioning(["parent", "guardian", "assent"])],
            ..Default::default()
        };
        ValidationOrchestrator::new(schema(), config)
            .unwrap()
            .with_tracker(Arc::new(ConsistencyTracker::new(5)))
    }

    fn pediatric_context(is_pediatric: bool, benefits: &str) -> GenerationContext {
        let mut values = extracted("12 weeks");
        values.insert(
            "is_pediatric".into(),
            ExtractedValue::from_backend("is_pediatric", FieldValue::Bool(is_pediatric), "r", 1, vec![]),
        );
        values.insert(
            "benefits_text".into(),
            ExtractedValue::from_backend("benefits_text", FieldValue::Text(benefits.into()), "r", 1, vec![]),
        );
        let mut ctx = context(GOOD);
        ctx.set_extracted(values);
        ctx
    }

    fn cross_field_warnings(report: &ValidationReport) -> usize {
        report
            .warnings
            .iter()
            .filter(|w| w.layer == LayerKind::Field && w.message.contains("pediatric_consent"))
            .count()
    }

    #[test]
    fn test_cross_field_rule_warns_without_blocking() {
        let validator = pediatric_validator();
        let ctx = pediatric_context(true, "Children may sleep better.");
        let report = validator.validate(&ctx, &[], 2);

        assert!(report.passed, "issues: {:?}", report.issues);
        assert_eq!(cross_field_warnings(&report), 1);
    }

    #[test]
    fn test_cross_field_rule_satisfied_or_not_applicable() {
        let validator = pediatric_validator();

        let mentioned = pediatric_context(true, "A Parent or guardian must agree.");
        assert_eq!(cross_field_warnings(&validator.validate(&mentioned, &[], 2)), 0);

        let adults = pediatric_context(false, "You may sleep better.");
        assert_eq!(cross_field_warnings(&validator.validate(&adults, &[], 2)), 0);
    }
}
