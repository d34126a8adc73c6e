// MIT License - Copyright (c) 2026 tapper-bridge contributors
// Tapper station control CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use tapper_bridge::sequences::calibration::{self, AdaptiveTimings};
use tapper_bridge::sequences::{dual_card, single_card, Position};
use tapper_bridge::{Config, TapperService};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "tapperctl")]
#[command(about = "Control ESP32 card-tapper stations over HTTP/MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Station to operate on
    #[arg(long, default_value = "station1")]
    station: String,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Print the device status
    Status,
    /// Connectivity and device health summary (JSON)
    Health,
    /// Tap Card 1 (timed sequence)
    TapCard1 {
        /// Reset to middle from an unknown position first
        #[arg(long)]
        safe: bool,
    },
    /// Tap Card 2 (timed sequence)
    TapCard2 {
        #[arg(long)]
        safe: bool,
    },
    /// Tap both cards in sequence
    Dual,
    /// Alternate Card 1 / Card 2 taps
    Alternate {
        #[arg(long, default_value_t = 3)]
        iterations: usize,
    },
    /// Reset the actuator to the middle position
    Reset {
        /// Position hint: card1, card2, or unknown
        #[arg(long, default_value = "unknown")]
        from: String,
    },
    /// Sweep candidate extend times and report which lands on middle
    Calibrate,
    /// Run drift-compensated Card 2 taps
    Adaptive {
        #[arg(long, default_value_t = 8)]
        taps: usize,
    },
    /// Legacy single-card simple tap
    SimpleTap,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=tapper_bridge=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let config_text =
        std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
    let config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;

    let mut service = TapperService::new(&cli.station, config);
    let connected = service
        .connect()
        .await
        .with_context(|| format!("Failed to connect to station '{}'", cli.station))?;
    if !connected {
        anyhow::bail!("no protocol connected for station '{}'", cli.station);
    }

    let result = run_action(&service, &cli.action).await;
    service.disconnect().await;
    result
}

async fn run_action(service: &TapperService, action: &Action) -> Result<()> {
    match action {
        Action::Status => {
            let status = service.get_status().await?;
            println!("{status}");
        }
        Action::Health => {
            let report = service.health_check().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Action::TapCard1 { safe } => {
            let tapper = service.protocol()?;
            let chain = tapper.lock().await;
            if *safe {
                dual_card::safe_tap_card1_timed(&*chain).await?;
            } else {
                dual_card::tap_card1_timed(&*chain).await?;
            }
        }
        Action::TapCard2 { safe } => {
            let tapper = service.protocol()?;
            let chain = tapper.lock().await;
            if *safe {
                dual_card::safe_tap_card2_timed(&*chain).await?;
            } else {
                dual_card::tap_card2_timed(&*chain).await?;
            }
        }
        Action::Dual => {
            let tapper = service.protocol()?;
            dual_card::dual_card_sequence_timed(&*tapper.lock().await).await?;
        }
        Action::Alternate { iterations } => {
            let tapper = service.protocol()?;
            dual_card::alternating_taps_timed(&*tapper.lock().await, *iterations).await?;
        }
        Action::Reset { from } => {
            let position = parse_position(from)?;
            let tapper = service.protocol()?;
            dual_card::reset_to_middle_timed(&*tapper.lock().await, position).await?;
        }
        Action::Calibrate => {
            let tapper = service.protocol()?;
            let report = calibration::calibrate_extend_time(&*tapper.lock().await).await?;
            for sample in &report.samples {
                println!(
                    "{}ms: landed at '{}' ({:?})",
                    sample.extend_ms, sample.after, sample.drift
                );
            }
            match report.recommended_extend_ms() {
                Some(ms) => println!("recommended extend time: {ms}ms"),
                None => println!("no candidate landed on middle"),
            }
        }
        Action::Adaptive { taps } => {
            let tapper = service.protocol()?;
            let chain = tapper.lock().await;
            let mut timings = AdaptiveTimings::default();
            for tap in 1..=*taps {
                info!("adaptive tap {tap}/{taps}");
                calibration::adaptive_tap_card2(&*chain, &mut timings).await?;
            }
            println!(
                "final timings: retract={}ms extend={}ms",
                timings.retract_ms(),
                timings.extend_ms()
            );
        }
        Action::SimpleTap => {
            let tapper = service.protocol()?;
            single_card::safe_simple_tap(&*tapper.lock().await).await?;
        }
    }
    Ok(())
}

fn parse_position(text: &str) -> Result<Position> {
    match text.to_lowercase().as_str() {
        "card1" => Ok(Position::Card1),
        "card2" => Ok(Position::Card2),
        "unknown" => Ok(Position::Unknown),
        other => anyhow::bail!("invalid position '{other}' (expected card1, card2, or unknown)"),
    }
}
