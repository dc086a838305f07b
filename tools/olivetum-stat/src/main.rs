//! Status query tool for a running Olivetum miner's read-only API.

mod output;

use std::io::IsTerminal;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use olivetum_supervisor::api::{StatusClient, TelemetrySample};
use olivetum_supervisor::chart::{RollingChart, DEFAULT_CAPACITY};
use olivetum_supervisor::tracing as logging;
use output::{format_sample, sample_json, OutputConfig};
use tracing_subscriber::filter::LevelFilter;

/// Query a miner's miner_getstat1 API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API port (the number after `--api-bind 127.0.0.1:-`)
    port: u16,

    /// API host
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Keep polling every N seconds until interrupted
    #[arg(short = 'w', long, value_name = "SECS", num_args = 0..=1, default_missing_value = "2")]
    watch: Option<u64>,

    /// Print each sample as one JSON object
    #[arg(long)]
    json: bool,

    /// Render the hash-rate chart to a PNG when done
    #[arg(long, value_name = "PNG")]
    chart: Option<PathBuf>,

    /// Chart size in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 240)]
    height: u32,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        logging::init_stdout_with_default(LevelFilter::DEBUG);
    }

    let client = StatusClient::new(SocketAddr::new(args.host, args.port));
    let config = OutputConfig {
        use_color: !args.no_color && std::io::stdout().is_terminal(),
    };
    let chart = RollingChart::new(DEFAULT_CAPACITY);

    match args.watch {
        None => {
            let sample = client
                .get_stat1()
                .await
                .with_context(|| format!("No status from {}", client.addr()))?;
            report(&sample, &args, &config, &chart);
        }
        Some(secs) => {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = ticker.tick() => {}
                }
                match client.get_stat1().await {
                    Ok(sample) => report(&sample, &args, &config, &chart),
                    Err(e) => eprintln!("{}: {}", client.addr(), e),
                }
            }
        }
    }

    if let Some(path) = &args.chart {
        chart
            .render(args.width, args.height)
            .save(path)
            .with_context(|| format!("Failed to write chart: {:?}", path))?;
        if let Some(labels) = chart.tick_labels() {
            eprintln!(
                "chart: {} .. {} {} (avg {:.2})",
                labels.bottom,
                labels.top,
                labels.unit,
                chart.average().unwrap_or_default()
            );
        }
    }

    Ok(())
}

fn report(sample: &TelemetrySample, args: &Args, config: &OutputConfig, chart: &RollingChart) {
    chart.add(sample.total_mhs());
    if args.json {
        println!("{}", sample_json(sample));
    } else {
        println!("{}", format_sample(sample, config));
    }
}
