//! qd-draw entry point

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use qd_cad::{HfssDesign, Mode, Modeler, ModelerConfig};

#[derive(Parser)]
#[command(name = "qd-draw")]
#[command(about = "Draw a demo transmon chip with the HFSS or GDS backend", long_about = None)]
struct Cli {
    /// RON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend mode ("hfss" or "gds"), overrides the configuration
    #[arg(short, long)]
    mode: Option<String>,

    /// Output directory, overrides the configuration
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Output file stem
    #[arg(short, long, default_value = "transmon")]
    name: String,
}

fn main() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qd_draw=info,qd_cad=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ModelerConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ModelerConfig::default(),
    };
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(out) = cli.out {
        config.output_dir = out;
    }

    let mode: Mode = config.mode.parse()?;
    tracing::info!("Drawing {} in {} mode", cli.name, mode);

    let path = match mode {
        Mode::Hfss => {
            let design = HfssDesign::new(config.hfss.design_name.clone());
            let mut modeler = Modeler::hfss(design.clone())?;
            demo::draw_transmon(&mut modeler)?;

            let path = config.output_dir.join(format!("{}.py", cli.name));
            design.save_script(&path)?;
            path
        }
        Mode::Gds => {
            let mut modeler = Modeler::from_config(&config)?;
            demo::draw_transmon(&mut modeler)?;
            modeler.generate_gds(&config.output_dir, &format!("{}.gds", cli.name))?
        }
    };

    tracing::info!("Wrote {}", path.display());
    Ok(())
}
