use anyhow::{Context, Result};
use fire_inspection_pipeline::config::{DEFAULT_CONFIG_PATH, PipelineConfig};
use fire_inspection_pipeline::fetcher::{FileCsvSource, HttpCsvSource, RecordSource};
use fire_inspection_pipeline::pipeline::Pipeline;
use std::env;
use tracing::{error, info, warn};

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let config_path = arg_value(&args, "--config").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let from_file = arg_value(&args, "--from-file");

    let config = PipelineConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load pipeline configuration from {}", config_path))?;

    info!("🚀 Starting fire inspection pipeline: {}", config.source.name);
    info!(
        "Output directory: {}, analysis table: {}",
        config.output.directory.display(),
        config.output.analysis_table.display()
    );

    let source: Box<dyn RecordSource> = match from_file {
        Some(path) => {
            info!("Reading raw inspections from local file {}", path);
            Box::new(FileCsvSource::new(path))
        }
        None => Box::new(HttpCsvSource::from_config(&config).context("Failed to initialize HTTP source")?),
    };

    let pipeline = Pipeline::new(config);
    let outcome = match pipeline.run(source.as_ref()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("❌ Pipeline run failed: {}", e);
            return Err(e).context("Fire inspection pipeline aborted");
        }
    };

    let cleaning = &outcome.report.cleaning;
    info!("\n=== Pipeline Summary (run {}) ===", outcome.run_id);
    info!(
        "📊 {} of {} raw rows kept in the analysis table",
        cleaning.accepted_rows, cleaning.input_rows
    );
    if cleaning.rejected_rows() > 0 {
        warn!("⚠️ {} rows dropped during cleaning", cleaning.rejected_rows());
    }

    outcome.report.print();

    for path in &outcome.model_paths {
        info!("💾 Model artifact: {}", path.display());
    }
    info!("💾 Run report: {}", outcome.report_path.display());
    info!("🎉 Fire inspection pipeline completed successfully!");

    Ok(())
}
