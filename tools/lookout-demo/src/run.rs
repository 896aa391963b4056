//! Run command - profile the scene and tick the monitor
//!
//! Registers every ship and asteroid, then steps the scene at a fixed frame
//! time and prints the enabled units whenever the monitor updates.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use lookout_core::{ErrorCategory, Monitor, MonitoringSettings, ProfilingStatus, UnitView};

use crate::scene::Scene;

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Number of frames to simulate
    #[arg(short, long, default_value = "120")]
    pub frames: u64,

    /// Simulated frame time in milliseconds
    #[arg(long, default_value = "16")]
    pub frame_ms: u64,

    /// Filter applied once profiling completes
    #[arg(short = 'F', long)]
    pub filter: Option<String>,

    /// Settings file (defaults to the platform config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Keep rich text color tags in labels
    #[arg(long)]
    pub rich: bool,

    /// Profile on the calling thread instead of in the background
    #[arg(long)]
    pub sync: bool,

    /// Print the table every N monitor updates
    #[arg(long, default_value = "10")]
    pub print_every: u64,

    /// Destroy the last ship at this frame
    #[arg(long)]
    pub destroy_at: Option<u64>,
}

/// Execute the run command
pub fn execute(args: RunArgs) -> Result<()> {
    let mut settings = match &args.config {
        Some(path) => MonitoringSettings::load_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => MonitoringSettings::load(),
    };
    settings.formatting.rich_text = args.rich;
    if args.sync {
        settings.general.async_profiling = false;
    }

    let mut monitor = Monitor::new(Arc::new(settings));
    let mut scene = Scene::new();

    monitor.begin_profiling(crate::scene::assemblies())?;

    // Registered before profiling finishes; the monitor queues them
    for ship in &scene.ships {
        monitor.register_target(ship, &ship.callsign);
    }
    for (index, asteroid) in scene.asteroids.iter().enumerate() {
        monitor.register_target(asteroid, &format!("Asteroid {}", index));
    }

    monitor.wait_for_profiling()?;
    match monitor.status() {
        ProfilingStatus::Ready => {}
        ProfilingStatus::Disabled => {
            println!("Monitoring is disabled in the settings");
            return Ok(());
        }
        status => bail!("Profiling did not complete: {:?}", status),
    }

    let stats = monitor.stats().clone();
    tracing::info!(
        "Scanned {} assemblies ({} skipped), {} profiles, {} incompatible members",
        stats.assemblies_scanned,
        stats.assemblies_skipped,
        stats.profiles_created,
        stats.incompatible_members
    );

    if let Some(filter) = &args.filter {
        monitor.apply_filter(filter);
    }
    monitor.set_visible(true);

    let dt = Duration::from_millis(args.frame_ms);
    let print_every = args.print_every.max(1);
    let mut updates = 0u64;

    for frame in 1..=args.frames {
        if args.destroy_at == Some(frame)
            && let Some(ship) = scene.destroy_ship()
        {
            tracing::info!("Destroying {}", ship.callsign);
            drop(ship);
        }

        scene.step(dt.as_secs_f32());
        if monitor.tick(dt) {
            updates += 1;
            if updates % print_every == 0 {
                print_table(frame, &monitor.snapshot());
            }
        }
    }

    print_table(args.frames, &monitor.snapshot());
    print_summary(&monitor, updates);

    monitor.shutdown();
    Ok(())
}

fn print_table(frame: u64, views: &[UnitView]) {
    println!("--- frame {} ---", frame);
    for view in views.iter().filter(|view| view.enabled) {
        println!("{:>5}  {:<12} {}", view.id.to_string(), view.target_name, view.state);
    }
}

fn print_summary(monitor: &Monitor, updates: u64) {
    let scheduler = monitor.scheduler();
    println!();
    println!(
        "Updates: {} ({} scheduler ticks, {} validation passes)",
        updates,
        scheduler.update_ticks(),
        scheduler.validation_ticks()
    );
    println!(
        "Units: {} ({} active)",
        monitor.units().len(),
        scheduler.active().len()
    );
    if let Some(filter) = monitor.active_filter() {
        println!("Filter: {}", filter);
    }
    for category in ErrorCategory::ALL {
        let count = monitor.logger().count(category);
        if count > 0 {
            println!("{:?} errors: {}", category, count);
        }
    }
}
