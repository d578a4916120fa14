//! Distill CLI
//!
//! Commands: extract, validate, check-schema
//! Outputs JSON to stdout, logs to stderr.
//! `validate` exits 1 when the report does not pass.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use distill_core::{ExtractedValues, FieldSchema, GenerationContext, ValidationOrchestrator};
use distill_runtime::{ExtractionEngine, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(name = "distill")]
#[command(about = "Extract fields from long documents and validate their summaries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Runtime configuration (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract every schema field using patterns and defaults only
    Extract {
        /// Field schema (YAML or JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Source document (plain text)
        #[arg(short, long)]
        document: PathBuf,
    },

    /// Run the four validation layers over a rendered summary
    Validate {
        /// Field schema (YAML or JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Extracted values as JSON, as printed by `extract`
        #[arg(long)]
        values: PathBuf,

        /// Rendered summary text
        #[arg(short, long)]
        rendered: PathBuf,

        /// Expected number of sections
        #[arg(long)]
        sections: usize,

        /// Document type, part of the consistency key
        #[arg(long, default_value = "document")]
        document_type: String,

        /// Template identifier, part of the consistency key
        #[arg(short, long, default_value = "default")]
        template: String,
    },

    /// Load and check a field schema
    CheckSchema {
        /// Field schema (YAML or JSON)
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract { schema, document } => {
            let schema = load_schema(&schema)?;
            let text = read_text(&document)?;

            let engine = ExtractionEngine::deterministic().with_config(config.extraction);
            let values = engine.extract(&text, &schema).await?;

            println!("{}", serde_json::to_string_pretty(&values)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate {
            schema,
            values,
            rendered,
            sections,
            document_type,
            template,
        } => {
            let schema = Arc::new(load_schema(&schema)?);
            let raw = read_text(&values)?;
            let extracted: ExtractedValues = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid values file {}", values.display()))?;
            let rendered = read_text(&rendered)?;

            let mut context = GenerationContext::new(String::new(), document_type, template);
            context.set_extracted(extracted);
            context.declare_critical_from(&schema);
            context.set_rendered(rendered);

            let validator = ValidationOrchestrator::new(schema, config.validation)?;
            let report = validator.validate(&context, &context.critical_values(), sections);

            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.passed {
                Ok(ExitCode::SUCCESS)
            } else {
                tracing::warn!(issues = report.issues.len(), "Validation failed");
                Ok(ExitCode::from(1))
            }
        }

        Commands::CheckSchema { path } => {
            let schema = load_schema(&path)?;
            let output = serde_json::json!({
                "valid": true,
                "name": schema.name(),
                "fields": schema.len(),
                "critical": schema.critical_names(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn load_schema(path: &Path) -> Result<FieldSchema> {
    let schema = FieldSchema::from_path(path)
        .with_context(|| format!("Failed to load schema {}", path.display()))?;
    tracing::debug!(path = %path.display(), fields = schema.len(), "Schema loaded");
    Ok(schema)
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
