//! CLI entry point for parachute_daq.
//!
//! Tares the load-cell bridge, finds and configures the DATAQ instrument, then hands
//! control to the operator: `g` starts logging, `s` stops, `q` quits. Keys are typed
//! on stdin followed by ENTER.
//!
//! ```bash
//! parachute-daq --config config/default.toml --output-dir runs/drop-07
//! parachute-daq --simulate --skip-tare
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use parachute_daq::acquisition::operator::spawn_stdin_reader;
use parachute_daq::acquisition::{AcquisitionController, ChannelInput};
use parachute_daq::bridge::{simulated, VoltageRatioInput, WeightSource};
use parachute_daq::config::{Settings, BRIDGE_CHANNELS};
use parachute_daq::data::{AnemometerCsvWriter, CsvRecordWriter, RecordSink, RunMetadataBuilder};
use parachute_daq::error::DaqError;
use parachute_daq::instrument::mock::{MockSerialPort, SimulatedScanStream};
use parachute_daq::instrument::{serial, InstrumentSession, SerialTransport};
use parachute_daq::logging;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Configuration used when `--config` is not given and the file exists.
const DEFAULT_CONFIG: &str = "config/default.toml";

/// Scan cycles per second produced by the simulated instrument.
const SIMULATED_CYCLES_PER_SECOND: f64 = 200.0;

#[derive(Parser)]
#[command(name = "parachute-daq")]
#[command(about = "Synchronized wind and load-cell logging for parachute drop tests", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the CSV logs and metadata
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Run against a simulated instrument and bridge
    #[arg(long)]
    simulate: bool,

    /// Use the configured bridge offsets instead of taring
    #[arg(long)]
    skip_tare: bool,

    /// Retry discovery every SECS seconds instead of waiting for ENTER
    #[arg(long, value_name = "SECS")]
    retry_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    logging::init(&settings.application.log_level);
    info!("{} v{}", settings.application.name, env!("CARGO_PKG_VERSION"));

    let (weights, tared, bridge_task) = start_bridge(&settings, &cli).await?;

    let transport = if cli.simulate {
        simulated_instrument(&settings)
    } else {
        discover_with_retry(&settings, cli.retry_interval).await?
    };
    let port_name = transport.name().to_string();

    let mut session = InstrumentSession::new(transport, settings.instrument.clone());
    let scan = session
        .configure()
        .await
        .context("Instrument configuration failed")?
        .clone();

    let storage = &settings.storage;
    let sinks: Vec<Box<dyn RecordSink>> = vec![
        Box::new(
            CsvRecordWriter::create(storage.combined_path())
                .with_context(|| format!("Failed to create {}", storage.combined_path().display()))?,
        ),
        Box::new(
            AnemometerCsvWriter::create(storage.anemometer_path())
                .with_context(|| format!("Failed to create {}", storage.anemometer_path().display()))?,
        ),
    ];

    if storage.write_metadata {
        let calibrations = (0..BRIDGE_CHANNELS)
            .map(|channel| weights.calibration(channel))
            .collect::<Result<Vec<_>, DaqError>>()?;
        RunMetadataBuilder::new()
            .application(&settings.application.name)
            .port(&port_name)
            .scan(&scan.scan_list, &scan.range_table)
            .timing(settings.instrument.sample_rate, settings.instrument.decimation)
            .wind(settings.wind.clone())
            .bridge(calibrations, tared)
            .record_interval_s(storage.record_interval().as_secs_f64())
            .build()
            .save(&storage.metadata_path())
            .context("Failed to write run metadata")?;
    }

    let (sender, mut input) = ChannelInput::new();
    spawn_stdin_reader(sender).context("Failed to start operator input")?;

    let mut controller = AcquisitionController::new(session, weights, sinks, &settings)?;
    let summary = controller.run(&mut input).await.context("Acquisition failed")?;

    if let Some(task) = bridge_task {
        task.abort();
    }
    info!(
        "Wrote {} record(s) from {} scan cycle(s) to {}",
        summary.records,
        summary.cycles,
        storage.combined_path().display()
    );
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let path = cli.config.clone().or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG);
        default.exists().then_some(default)
    });
    let mut settings = Settings::load(path.as_deref())
        .with_context(|| format!("Failed to load configuration {:?}", path.as_deref().map(Path::display)))?;

    if let Some(dir) = &cli.output_dir {
        settings.storage.output_dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        settings.application.log_level = level.to_lowercase();
    }
    if cli.skip_tare {
        settings.bridge.tare_on_start = false;
    }
    settings.validate().context("Invalid command-line overrides")?;
    Ok(settings)
}

/// Sets up the weight source; in simulation also the channels that feed it.
///
/// Returns whether the offsets come from a tare in this run.
async fn start_bridge(
    settings: &Settings,
    cli: &Cli,
) -> Result<(WeightSource, bool, Option<JoinHandle<()>>)> {
    let bridge = &settings.bridge;
    let tare = bridge.tare_on_start;
    let weights = WeightSource::new(&bridge.channels, bridge.tare_samples, !tare);

    if !cli.simulate {
        warn!("No bridge driver attached; load-cell weights will read 0.0");
        return Ok((weights, false, None));
    }

    let channels = simulated::default_channels(bridge.data_interval());
    if tare {
        let inputs: Vec<Arc<dyn VoltageRatioInput>> = channels
            .iter()
            .map(|channel| Arc::clone(channel) as Arc<dyn VoltageRatioInput>)
            .collect();
        weights.tare_all(&inputs).await.context("Bridge tare failed")?;
    }
    let task = simulated::spawn_callbacks(channels, weights.updater());
    Ok((weights, tare, Some(task)))
}

fn simulated_instrument(settings: &Settings) -> Box<dyn SerialTransport> {
    let full_scale = settings.instrument.analog_ranges.first().copied().unwrap_or(10.0);
    let stream = SimulatedScanStream::new(
        &settings.instrument.scan_list(),
        full_scale,
        settings.wind.clone(),
        SIMULATED_CYCLES_PER_SECOND,
    );
    let (port, _handle) = MockSerialPort::simulated("simulated", stream);
    info!("Using simulated DATAQ instrument");
    Box::new(port)
}

/// Discovers the instrument, asking the operator to connect it between attempts.
async fn discover_with_retry(
    settings: &Settings,
    retry_interval: Option<u64>,
) -> Result<Box<dyn SerialTransport>> {
    loop {
        match serial::discover(&settings.instrument) {
            Ok(transport) => return Ok(transport),
            Err(e @ DaqError::Discovery { .. }) => {
                warn!("{}", e);
                match retry_interval {
                    Some(secs) => {
                        info!("Please connect a DATAQ Instruments device; retrying in {}s", secs);
                        tokio::time::sleep(Duration::from_secs(secs)).await;
                    }
                    None => {
                        info!("Please connect a DATAQ Instruments device and press ENTER");
                        let eof = tokio::task::spawn_blocking(|| {
                            let mut line = String::new();
                            std::io::stdin().read_line(&mut line).map(|read| read == 0)
                        })
                        .await
                        .context("Operator prompt failed")??;
                        if eof {
                            anyhow::bail!("stdin closed while waiting for the instrument");
                        }
                    }
                }
            }
            Err(e) => return Err(e).context("Instrument discovery failed"),
        }
    }
}
