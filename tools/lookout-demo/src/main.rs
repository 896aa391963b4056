//! Lookout - Observed-value monitor demo
//!
//! Drives a small simulated scene through the monitor and prints the
//! enabled units as a plain table.
//!
//! # Commands
//!
//! - `lookout run` - Profile the scene, register its objects and tick the monitor
//! - `lookout instantiations` - List the accessor instantiations discovery produces
//! - `lookout config` - Write the default settings file
//!
//! # Usage
//!
//! ```bash
//! # Watch only vital members of the ship named Falcon
//! lookout run --filter "\$vital&@Fuel" --frames 240
//!
//! # Write defaults to the platform config directory
//! lookout config
//! ```

mod run;
mod scene;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use lookout_core::{Monitor, MonitoringSettings};

/// Lookout - Observed-value monitor demo
#[derive(Parser)]
#[command(name = "lookout")]
#[command(about = "Observed-value monitor demo")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile the demo scene and tick the monitor
    Run(run::RunArgs),

    /// List accessor instantiations produced by discovery
    Instantiations,

    /// Write the default settings file
    Config {
        /// Destination (defaults to the platform config directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run::execute(args),
        Commands::Instantiations => list_instantiations(),
        Commands::Config { out } => write_config(out),
    }
}

fn list_instantiations() -> Result<()> {
    let mut settings = MonitoringSettings::load();
    settings.general.async_profiling = false;
    settings.general.enable_monitoring = true;

    let mut monitor = Monitor::new(Arc::new(settings));
    monitor.begin_profiling(scene::assemblies())?;
    for instantiation in monitor.instantiations() {
        println!("{}", instantiation);
    }
    monitor.shutdown();
    Ok(())
}

fn write_config(out: Option<PathBuf>) -> Result<()> {
    let settings = MonitoringSettings::default();
    match out {
        Some(path) => {
            settings.save_to(&path)?;
            println!("Wrote {}", path.display());
        }
        None => {
            settings.save()?;
            match lookout_core::settings::config_dir() {
                Some(dir) => println!(
                    "Wrote {}",
                    dir.join(lookout_core::settings::SETTINGS_FILE).display()
                ),
                None => println!("No config directory available; nothing written"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_config_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lookout.toml");
        write_config(Some(path.clone())).unwrap();

        let loaded = MonitoringSettings::load_from(&path).unwrap();
        assert_eq!(loaded, MonitoringSettings::default());
    }

    #[test]
    fn test_cli_parses_run_args() {
        let cli = Cli::try_parse_from(["lookout", "run", "--frames", "30", "-F", "$vital"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected the run command");
        };
        assert_eq!(args.frames, 30);
        assert_eq!(args.frame_ms, 16);
        assert_eq!(args.filter.as_deref(), Some("$vital"));
    }
}
