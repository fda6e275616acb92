//! `whistle` CLI entry point (spec §6): dispatches to the offline stdin/
//! stdout path or the realtime audio-server path depending on whether an
//! input file is given.

use clap::Parser;
use std::io;
use tracing::{error, info};
use whistle::pipeline::Pipeline;
use whistle::stage::Registry;
use whistle::{DEFAULT_CLIENT_NAME, DEFAULT_OFFLINE_BLOCK_SIZE, DEFAULT_PIPELINE_DESC};

#[derive(Parser)]
#[command(name = "whistle")]
#[command(about = "Realtime IQ (complex baseband) DSP pipeline engine for software-defined radio")]
struct Cli {
    /// Sample rate in Hz. Required for offline mode; ignored (and taken from
    /// the audio server instead) for realtime mode.
    #[arg(short = 'r', long)]
    sample_rate: Option<f32>,

    /// Audio-server client name (realtime mode only).
    #[arg(short = 'j', long, default_value = DEFAULT_CLIENT_NAME)]
    client_name: String,

    /// Pipeline description: `stage,arg1,arg2:stage,arg1:...`.
    #[arg(short = 'p', long, default_value = DEFAULT_PIPELINE_DESC)]
    pipeline: String,

    /// Run in offline mode, reading interleaved f32 IQ from stdin and
    /// writing interleaved f32 IQ to stdout, instead of opening a realtime
    /// audio device.
    #[arg(short = 'o', long)]
    offline: bool,

    /// Block size in frames for offline mode.
    #[arg(short = 'b', long, default_value_t = DEFAULT_OFFLINE_BLOCK_SIZE)]
    block_size: u32,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result = if cli.offline {
        run_offline(&cli)
    } else {
        run_realtime(&cli)
    };

    if let Err(e) = result {
        error!(%e, "fatal error");
        std::process::exit(1);
    }
}

fn run_offline(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let sample_rate = cli
        .sample_rate
        .ok_or("offline mode requires -r/--sample-rate")?;

    let registry = Registry::with_builtins();
    let mut pipeline = Pipeline::new(sample_rate, cli.block_size, &cli.pipeline, &registry)?;

    info!(
        sample_rate,
        block_size = cli.block_size,
        pipeline = cli.pipeline,
        "running offline"
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut input = stdin.lock();
    let mut output = stdout.lock();
    whistle::offline::run(&mut pipeline, &mut input, &mut output)?;
    Ok(())
}

fn run_realtime(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::with_builtins();
    let engine = whistle::audio::AudioEngine::new(&cli.client_name, &cli.pipeline, &registry)?;

    info!(
        client = cli.client_name,
        sample_rate = engine.sample_rate(),
        block_size = engine.block_size(),
        "running realtime"
    );

    loop {
        std::thread::sleep(std::time::Duration::from_millis(200));
        if engine.is_fatal() {
            return Err("realtime-fatal hotswap failure, shutting down".into());
        }
    }
}
