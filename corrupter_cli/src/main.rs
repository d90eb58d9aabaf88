use clap::error::ErrorKind;
use clap::{ArgGroup, CommandFactory, Parser};
use corrupter_core::config::{ConfigError, CorrupterSettings, CorruptionConfig, ModeKind};
use corrupter_core::engine::Engine;
use corrupter_core::observer::{ConsoleProgress, NoOpObserver, ProgressObserver};
use corrupter_core::paths::{default_output_path, same_file};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Simulate data corruption by streaming a file through a byte-level mutation pass.
#[derive(Parser, Debug)]
#[command(name = "corrupter")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").args(["bitflip", "zero", "burst"])))]
struct Cli {
    /// Path of the file to corrupt
    input_file: PathBuf,

    /// Output path [default: <input-stem>_corrupted<.ext> next to the input]
    output_file: Option<PathBuf>,

    /// Per-byte corruption probability, e.g. 0.001 for 0.1% [default: 0.00001]
    #[arg(short, long)]
    probability: Option<f64>,

    /// Seed for a reproducible run
    #[arg(short, long)]
    seed: Option<u64>,

    /// Flip one random bit of each corrupted byte
    #[arg(short, long)]
    bitflip: bool,

    /// Set each corrupted byte to zero
    #[arg(short, long)]
    zero: bool,

    /// Overwrite N consecutive bytes per triggered trial
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    burst: Option<u64>,

    /// TOML file supplying defaults for probability, mode, burst-length and seed
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Hide the banner and progress line
    #[arg(short, long)]
    quiet: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output_path = resolve_output_path(&cli).unwrap_or_else(|e| e.exit());
    let config = build_config(&cli).unwrap_or_else(|e| e.exit());

    match corrupt(&cli, &output_path, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn usage_error(kind: ErrorKind, message: impl std::fmt::Display) -> clap::Error {
    Cli::command().error(kind, message)
}

/// Picks the destination and refuses to run when it would overwrite the input.
fn resolve_output_path(cli: &Cli) -> Result<PathBuf, clap::Error> {
    let output = cli
        .output_file
        .clone()
        .unwrap_or_else(|| default_output_path(&cli.input_file));

    let clash = same_file(&cli.input_file, &output).map_err(|e| usage_error(ErrorKind::Io, e))?;
    if clash {
        return Err(usage_error(
            ErrorKind::ArgumentConflict,
            "input and output must not be the same file; this would destroy the source",
        ));
    }
    Ok(output)
}

/// Layers command-line flags over the optional settings file.
fn settings_from_cli(cli: &Cli) -> Result<CorrupterSettings, ConfigError> {
    let mut settings = match &cli.config {
        Some(path) => CorrupterSettings::load_from_file(path)?,
        None => CorrupterSettings::default(),
    };

    if let Some(probability) = cli.probability {
        settings.probability = Some(probability);
    }
    if let Some(seed) = cli.seed {
        settings.seed = Some(seed);
    }
    if cli.bitflip {
        settings.mode = Some(ModeKind::BitFlip);
    } else if cli.zero {
        settings.mode = Some(ModeKind::Zero);
    } else if let Some(length) = cli.burst {
        settings.mode = Some(ModeKind::Burst);
        settings.burst_length = Some(length);
    }
    Ok(settings)
}

fn build_config(cli: &Cli) -> Result<CorruptionConfig, clap::Error> {
    settings_from_cli(cli)
        .and_then(CorrupterSettings::into_config)
        .map_err(|e| match e {
            ConfigError::Read { .. } => usage_error(ErrorKind::Io, e),
            other => usage_error(ErrorKind::InvalidValue, other),
        })
}

fn print_banner(
    out: &mut impl Write,
    input: &Path,
    output: &Path,
    config: &CorruptionConfig,
) -> io::Result<()> {
    let seed = config
        .seed()
        .map_or_else(|| "random".to_string(), |seed| seed.to_string());
    writeln!(out, "--- File corruption task (corrupter) ---")?;
    writeln!(out, "Input file:  {}", input.display())?;
    writeln!(out, "Output file: {}", output.display())?;
    writeln!(out, "Mode:        {}", config.mode())?;
    writeln!(out, "Probability: {:.5}%", config.probability() * 100.0)?;
    writeln!(out, "Seed:        {seed}")?;
    writeln!(out, "----------------------------------------\n")?;
    out.flush()
}

fn corrupt(cli: &Cli, output: &Path, config: CorruptionConfig) -> Result<(), anyhow::Error> {
    let show_progress = !cli.quiet && !cli.json;
    if show_progress {
        print_banner(&mut io::stdout().lock(), &cli.input_file, output, &config)?;
    }

    let mut console;
    let mut silent = NoOpObserver;
    let observer: &mut dyn ProgressObserver = if show_progress {
        console = ConsoleProgress::stdout();
        &mut console
    } else {
        &mut silent
    };

    let stats = Engine::new(config).run(&cli.input_file, output, observer)?;

    let mut out = io::stdout().lock();
    if cli.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&stats.report())?)?;
    } else {
        writeln!(out, "\n--- Task complete ---")?;
        writeln!(out, "{stats}")?;
        writeln!(out, "---------------------")?;
    }
    out.flush()?;
    Ok(())
}
