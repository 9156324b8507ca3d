use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use log::info;
use rashscan::{InferenceContext, PipelineConfig, Preprocessing};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image to classify
    image: Option<PathBuf>,

    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ONNX model file
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Label-map JSON (index -> label or label -> index)
    #[arg(short, long)]
    labels: Option<PathBuf>,

    /// Care-content catalog JSON
    #[arg(long)]
    care: Option<PathBuf>,

    /// Language for care tips
    #[arg(long)]
    lang: Option<String>,

    /// Feature scaling used when the model was trained
    #[arg(long, value_parser = parse_preprocessing)]
    preprocessing: Option<Preprocessing>,

    /// Abort the scan after this many milliseconds
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// Print the pipeline status as JSON after loading the model
    #[arg(long)]
    status: bool,
}

fn parse_preprocessing(value: &str) -> Result<Preprocessing, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|_| {
        format!(
            "unknown preprocessing '{}' (expected efficient_net, unit_range, symmetric_unit or image_net)",
            value
        )
    })
}

fn load_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(model) = &args.model {
        config.model_path = model.clone();
    }
    if let Some(labels) = &args.labels {
        config.labels_path = labels.clone();
    }
    if let Some(care) = &args.care {
        config.care_catalog_path = Some(care.clone());
    }
    if let Some(preprocessing) = args.preprocessing {
        config.preprocessing = preprocessing;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rashscan::init_logger();
    let args = Args::parse();

    info!("=== Starting Rash Scan ===");
    let config = load_config(&args)?;
    let context = Arc::new(InferenceContext::from_config(config)?);

    if args.status {
        // Surface model problems before any image is read
        if let Err(e) = context.model() {
            eprintln!("Model unavailable: {}", e);
        }
        println!("{}", serde_json::to_string_pretty(&context.status())?);
    }

    let Some(image_path) = &args.image else {
        if !args.status {
            anyhow::bail!("no image given; pass an image path or --status");
        }
        return Ok(());
    };

    let bytes = fs::read(image_path)
        .with_context(|| format!("Failed to read image {:?}", image_path))?;
    let start = Instant::now();
    let result = context
        .scan_with_timeout(bytes, args.lang.clone(), Duration::from_millis(args.timeout_ms))
        .await;

    match result {
        Ok(report) => {
            info!("Scan finished in {:.2?}", start.elapsed());
            println!("{}", report.to_json_pretty()?);
            Ok(())
        }
        Err(e) => {
            eprintln!("\nError scanning {:?}: {}", image_path, e);
            eprintln!("Status: {} ({:?})", e.status_code(), e.kind());
            Err(e.into())
        }
    }
}
