//! cellmesh-roamd: client roaming daemon with a Blinkt! signal bar.
//!
//! ```text
//! cellmesh-roamd --validate-config
//! cellmesh-roamd --diagnose --interface wlan1
//! cellmesh-roamd --output log --simulate --seed 7
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context as _};
use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use cellmesh_roam::clock::SystemTimer;
use cellmesh_roam::config::Config;
use cellmesh_roam::daemon::{self, Daemon};
use cellmesh_roam::render::blinkt::BlinktBar;
use cellmesh_roam::render::{ensure_fits, LedBar, LogBar};
use cellmesh_roam::report;
use cellmesh_roam::wifi::iw::IwControl;
use cellmesh_roam::wifi::sim::SimulatedRadio;
use cellmesh_roam::wifi::WifiControl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    /// Pimoroni Blinkt! on the GPIO header.
    Blinkt,
    /// Log frames instead of driving hardware.
    Log,
}

/// Client roaming daemon for the cell-mesh Wi-Fi simulator.
#[derive(Parser, Debug)]
#[command(name = "cellmesh-roamd", version, about = "Cell-mesh client roaming + LED daemon")]
struct Cli {
    /// Tower map JSON.
    #[arg(long, default_value = "/etc/cellmesh/client_tower_config.json")]
    tower_config: PathBuf,

    /// Runtime tunables JSON (missing file = defaults).
    #[arg(long, default_value = "/etc/cellmesh/client_roaming_led.json")]
    runtime_config: PathBuf,

    /// Wi-Fi interface override (e.g. wlan0).
    #[arg(long)]
    interface: Option<String>,

    /// Validate both config files, report every violation and exit.
    #[arg(long, default_value_t = false)]
    validate_config: bool,

    /// Query the link and scan once, then exit.
    #[arg(long, default_value_t = false)]
    diagnose: bool,

    /// Log filter (`info`, `debug`, `cellmesh_roam=trace`, ...). Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,

    /// Where frames go.
    #[arg(long, value_enum, default_value_t = Output::Blinkt)]
    output: Output,

    /// Offset added to BCM pin numbers for the sysfs GPIO chip.
    #[arg(long, default_value_t = 0)]
    gpio_base: u32,

    /// Use a simulated radio instead of `iw`.
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Seed for the simulated radio.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_level.as_deref()) {
        eprintln!("cellmesh-roamd: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

// ─── Logging ────────────────────────────────────────────────────────────────

fn init_logging(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(level) => {
            let level = match level.to_ascii_lowercase().as_str() {
                "warning" => "warn".to_string(),
                "critical" => "error".to_string(),
                other => other.to_string(),
            };
            EnvFilter::try_new(&level).with_context(|| format!("invalid --log-level {level:?}"))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

// ─── Modes ──────────────────────────────────────────────────────────────────

fn run(cli: Cli) -> anyhow::Result<()> {
    let interface = cli.interface.as_deref();

    if cli.validate_config {
        if daemon::validate(&cli.tower_config, &cli.runtime_config, interface) {
            return Ok(());
        }
        bail!("configuration invalid");
    }

    let config = match Config::load(&cli.tower_config, &cli.runtime_config, interface) {
        Ok(config) => config,
        Err(e) => {
            for v in e.into_violations() {
                error!("{}", report::violation(&v));
            }
            bail!("configuration error");
        }
    };

    let timer = SystemTimer::new();
    let mut wifi: Box<dyn WifiControl> = if cli.simulate {
        Box::new(SimulatedRadio::new(&config.towers, cli.seed))
    } else {
        Box::new(IwControl::new(&config.runtime.interface))
    };

    if cli.diagnose {
        return daemon::diagnose(&config, &mut wifi, &timer);
    }

    let mut bar: Box<dyn LedBar> = match cli.output {
        Output::Blinkt => Box::new(BlinktBar::open(cli.gpio_base).context("opening Blinkt LEDs")?),
        Output::Log => Box::new(LogBar),
    };
    ensure_fits(&bar, config.runtime.pixels)
        .context("configured pixels do not fit the LED bar")?;
    bar.clear().context("clearing LEDs")?;

    // ── Graceful shutdown ───────────────────────────────────────
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("installing signal handler")?;

    Daemon::new(config, wifi, bar, timer).run(&stop_rx)
}
