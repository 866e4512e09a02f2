use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde_json::Value;

use plain_language_lens::config::{self, LensConfig};
use plain_language_lens::{init_tracing, OllamaClient, PlainLanguageLens};

/// Annotate an ePI bundle with plain-language explanations for a patient.
#[derive(Parser, Debug)]
#[command(name = "plain-language-lens", version)]
struct Cli {
    /// ePI bundle (FHIR JSON)
    #[arg(long)]
    epi: PathBuf,

    /// IPS patient summary bundle (FHIR JSON)
    #[arg(long)]
    ips: PathBuf,

    /// Model selector, defaults to LENS_MODEL
    #[arg(long, default_value = "")]
    model: String,

    /// Write the annotated bundle here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn read_bundle(path: &Path) -> anyhow::Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = LensConfig::from_env()?;
    init_tracing();

    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let epi = read_bundle(&cli.epi)?;
    let ips = read_bundle(&cli.ips)?;

    let backend = OllamaClient::from_config(&settings)?;
    tracing::info!(url = %backend.base_url(), "Using Ollama backend");
    let lens = PlainLanguageLens::new(Box::new(backend)).with_default_model(&settings.default_model);

    let run = lens.run(epi, &ips, &cli.model)?;
    tracing::info!(
        annotations = run.simplification.responses.len(),
        model = %run.simplification.model,
        "Lens applied"
    );

    let rendered = serde_json::to_string_pretty(&run.bundle)?;
    match cli.output {
        Some(path) => fs::write(&path, rendered)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{rendered}"),
    }

    Ok(())
}
