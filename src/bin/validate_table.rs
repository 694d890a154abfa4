use anyhow::{Context, Result};
use fire_inspection_pipeline::config::{DEFAULT_CONFIG_PATH, PipelineConfig};
use fire_inspection_pipeline::storage::TableStore;
use fire_inspection_pipeline::validation::SchemaValidator;
use std::env;
use std::path::PathBuf;
use std::process;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut config_path = DEFAULT_CONFIG_PATH.to_string();
    let mut table_path: Option<PathBuf> = None;

    let mut i = 0;
    while i < args.len() {
        if args[i] == "--config" {
            if let Some(path) = args.get(i + 1) {
                config_path = path.clone();
            }
            i += 2;
        } else {
            table_path = Some(PathBuf::from(&args[i]));
            i += 1;
        }
    }

    let config = PipelineConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load pipeline configuration from {}", config_path))?;
    let table_path = table_path.unwrap_or_else(|| config.output.analysis_table.clone());

    println!("=== VALIDATING {} ===\n", table_path.display());

    let df = TableStore::new(&table_path)
        .read()
        .with_context(|| format!("Failed to read analysis table {}", table_path.display()))?;

    let report = SchemaValidator::from_schema(&config.schema).run_all(&df);
    for outcome in &report.outcomes {
        match &outcome.message {
            Some(message) if !outcome.passed => println!("FAIL {:<22} {}", outcome.check.to_string(), message),
            _ => println!("ok   {}", outcome.check),
        }
    }

    let failed = report.outcomes.iter().filter(|o| !o.passed).count();
    if failed > 0 {
        println!("\n{} of {} checks failed", failed, report.outcomes.len());
        process::exit(1);
    }

    println!("\nAll {} checks passed ({} rows)", report.outcomes.len(), df.height());
    Ok(())
}
