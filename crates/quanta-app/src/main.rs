use anyhow::Result;
use clap::Parser;
use quanta_app::{Cli, LabKind, run_music, run_psyche};
use tracing::info;

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let options = cli.run_options();
    info!(lab = ?cli.lab, ticks = options.ticks, dt = options.dt, "Starting Quanta headless run");
    let report = match cli.lab {
        LabKind::Music => serde_json::to_string_pretty(&run_music(cli.music_config()?, &options)?)?,
        LabKind::Psyche => serde_json::to_string_pretty(&run_psyche(cli.psyche_config()?, &options)?)?,
    };
    println!("{report}");
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
