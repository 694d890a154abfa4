use anyhow::{Context, Result, anyhow};
use fire_inspection_pipeline::simulate::{SimulationParams, simulate_raw_csv};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::env;
use std::path::PathBuf;
use tracing::info;

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();

    let rows = match arg_value(&args, "--rows") {
        Some(value) => value.parse::<usize>().map_err(|e| anyhow!("Invalid --rows {}: {}", value, e))?,
        None => 1000,
    };
    let seed = match arg_value(&args, "--seed") {
        Some(value) => value.parse::<u64>().map_err(|e| anyhow!("Invalid --seed {}: {}", value, e))?,
        None => 853,
    };
    let out = PathBuf::from(arg_value(&args, "--out").unwrap_or_else(|| "outputs/simulated/inspections.csv".to_string()));

    let params = SimulationParams {
        rows,
        ..SimulationParams::default()
    };
    let csv = simulate_raw_csv(&params, &mut StdRng::seed_from_u64(seed)).context("Failed to simulate inspections")?;

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&out, &csv).with_context(|| format!("Failed to write {}", out.display()))?;

    info!("✅ Wrote {} simulated inspections (seed {}) to {}", rows, seed, out.display());
    Ok(())
}
