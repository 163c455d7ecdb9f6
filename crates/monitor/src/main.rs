//! Capmon Monitor
//!
//! Headless console consumer for the 16x16 sensor matrix: opens the serial
//! link, decodes frames, archives every frame to SQLite, and logs live
//! transfer statistics.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use capmon_core::{
    available_ports, DeviceCommand, FrameDecoder, LinkEvent, LinkStatus, MatrixFrame,
    OutputMode, PointSample, Quantizer, SerialLink, StorageConfig, StorageEngine,
    TransportConfig, MATRIX_CELLS, MATRIX_DIM,
};

/// Capmon Monitor - console monitor for the 16x16 sensor matrix
#[derive(Parser, Debug)]
#[command(name = "capmon-monitor")]
#[command(author = "Capmon Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Console monitor and recorder for the sensor matrix", long_about = None)]
struct Args {
    /// Serial port to open (auto-selects the first port if omitted)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, default_value_t = 115_200)]
    baud: u32,

    /// SQLite database file for frame recording
    #[arg(long, default_value = "matrix_data.db")]
    db: std::path::PathBuf,

    /// List available ports and exit
    #[arg(long)]
    list: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Frame period requested from the device, in milliseconds
    #[arg(long)]
    rate: Option<u32>,

    /// Quantize recorded values to this level count (255 or 1023)
    /// instead of storing raw readings
    #[arg(long)]
    quant_level: Option<u16>,

    /// Quantization input range as min:max
    #[arg(long, default_value = "0:100000")]
    quant_range: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level)?;

    if args.list {
        let ports = available_ports().context("Failed to enumerate serial ports")?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port.display_name());
        }
        return Ok(());
    }

    let (mode, quantizer) = quant_settings(&args)?;

    let port = match args.port.clone() {
        Some(p) => p,
        None => {
            let ports = available_ports().context("Failed to enumerate serial ports")?;
            let first = ports
                .into_iter()
                .next()
                .context("No serial ports found; specify one with --port")?;
            info!(port = %first.display_name(), "auto-selected port");
            first.device
        }
    };

    let storage = StorageEngine::open(StorageConfig {
        db_path: args.db.clone(),
        ..StorageConfig::default()
    })
    .await
    .context("Failed to open storage")?;

    let (link, mut events) = SerialLink::connect(&port, args.baud, TransportConfig::default())
        .with_context(|| format!("Failed to open {port}"))?;

    // Push the device-side configuration matching what we record.
    if let Some(rate) = args.rate {
        link.send(&DeviceCommand::SetRate(rate));
    }
    link.send(&DeviceCommand::SetMode(mode));
    if mode == OutputMode::Quant {
        link.send(&DeviceCommand::SetRange {
            min: quantizer.min,
            max: quantizer.max,
        });
        link.send(&DeviceCommand::SetLevel(quantizer.level as u16));
    }

    let mut decoder = FrameDecoder::new();

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    LinkEvent::Line(line) => {
                        if let Some(frame) = decoder.feed(&line) {
                            record_frame(&storage, &frame, mode, &quantizer);
                        }
                    }
                    LinkEvent::Status(LinkStatus::Connected { port }) => {
                        info!(%port, "connected");
                    }
                    LinkEvent::Status(LinkStatus::Disconnected { reason }) => {
                        warn!(%reason, "disconnected; reconnect with a fresh run");
                        break;
                    }
                    LinkEvent::Status(LinkStatus::Error { message }) => {
                        error!(%message, "link error");
                    }
                }
            }
        }
    }

    link.disconnect().await;
    storage.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Log transfer statistics for a finalized frame, then cut it into
/// per-cell samples and queue them for storage.
fn record_frame(
    storage: &StorageEngine,
    frame: &MatrixFrame,
    mode: OutputMode,
    quantizer: &Quantizer,
) {
    info!(
        frame_id = frame.frame_id,
        format = ?frame.format,
        bytes = frame.byte_count,
        elapsed_ms = format_args!("{:.1}", frame.elapsed_ms),
        rate_kbps = format_args!("{:.1}", frame.throughput_kbps()),
        rows = frame.rows_seen.len(),
        "frame received"
    );

    let ts = chrono::Utc::now();
    let mut samples = Vec::with_capacity(MATRIX_CELLS);
    for row in 0..MATRIX_DIM {
        for col in 0..MATRIX_DIM {
            let raw = frame.values[row][col];
            samples.push(PointSample {
                timestamp: ts,
                row: row as u8,
                col: col as u8,
                value: quantizer.display_value(mode, raw),
                raw_value: raw,
                frame_id: Some(frame.frame_id),
            });
        }
    }

    let accepted = storage.add_frame_points(samples);
    if accepted < MATRIX_CELLS {
        warn!(
            dropped = MATRIX_CELLS - accepted,
            "storage queue full, frame partially recorded"
        );
    }
}

/// Resolve the recording mode and quantizer from the CLI flags.
fn quant_settings(args: &Args) -> Result<(OutputMode, Quantizer)> {
    let (min_str, max_str) = args
        .quant_range
        .split_once(':')
        .context("Quant range must be min:max")?;
    let min: i64 = min_str.trim().parse().context("Invalid quant range minimum")?;
    let max: i64 = max_str.trim().parse().context("Invalid quant range maximum")?;

    match args.quant_level {
        Some(level) => {
            anyhow::ensure!(
                level == 255 || level == 1023,
                "Quant level must be 255 or 1023"
            );
            Ok((
                OutputMode::Quant,
                Quantizer {
                    min,
                    max,
                    level: level as i64,
                },
            ))
        }
        None => Ok((OutputMode::Raw, Quantizer::default())),
    }
}

/// Setup logging with tracing
fn setup_logging(level: &str) -> Result<()> {
    let log_level = level.parse::<Level>().unwrap_or(Level::INFO);

    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
