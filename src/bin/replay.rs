//! shellsentry-replay - run a recorded transcript through the runner and detector
//!
//! The transcript stands in for a remote shell. `{start}` and `{end}` in the
//! file are replaced by the generated markers, and the bytes are fed back in
//! fixed-size chunks once the wrapped command has been written. Surfaced
//! lines, detector events and the final result are printed as JSON lines.

use std::env;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context};
use serde_json::json;
use tracing::{debug, info};

use shellsentry::{
    CommandRunner, ConfigLoader, DetectorHandle, InteractionDetector, InteractionEventBus,
    InteractionSubscription, OutputLine, RunnerHooks, SessionStream, Taxonomy,
};

/// Replay configuration
#[derive(Debug)]
struct ReplayArgs {
    /// Transcript file
    transcript: PathBuf,
    /// Command text used for classification
    command: String,
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Bytes per replayed chunk
    chunk_size: usize,
    /// Pause between chunks
    delay_ms: u64,
    /// Requested command timeout
    timeout_ms: Option<u64>,
    /// Enable debug logging
    debug: bool,
}

impl ReplayArgs {
    /// Parse command line arguments
    fn parse() -> anyhow::Result<Self> {
        let args: Vec<String> = env::args().collect();
        let mut transcript = None;
        let mut command = "replay".to_string();
        let mut config_path = None;
        let mut chunk_size = 64;
        let mut delay_ms = 0;
        let mut timeout_ms = None;
        let mut debug = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--command" | "-c" => {
                    command = value_of(&args, i)?.to_string();
                    i += 1;
                }
                "--config" => {
                    config_path = Some(PathBuf::from(value_of(&args, i)?));
                    i += 1;
                }
                "--chunk-size" | "-n" => {
                    chunk_size = value_of(&args, i)?.parse().context("Invalid chunk size")?;
                    i += 1;
                }
                "--delay-ms" => {
                    delay_ms = value_of(&args, i)?.parse().context("Invalid delay")?;
                    i += 1;
                }
                "--timeout-ms" | "-t" => {
                    timeout_ms = Some(value_of(&args, i)?.parse().context("Invalid timeout")?);
                    i += 1;
                }
                "--debug" | "-d" => {
                    debug = true;
                }
                "--help" | "-h" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-V" => {
                    println!("shellsentry-replay v{}", shellsentry::VERSION);
                    process::exit(0);
                }
                arg if arg.starts_with('-') => {
                    bail!("Unknown option: {}", arg);
                }
                arg => {
                    if transcript.is_some() {
                        bail!("Unexpected argument: {}", arg);
                    }
                    transcript = Some(PathBuf::from(arg));
                }
            }
            i += 1;
        }

        if chunk_size == 0 {
            bail!("Chunk size must be greater than zero");
        }

        Ok(Self {
            transcript: transcript.context("Missing transcript path")?,
            command,
            config_path,
            chunk_size,
            delay_ms,
            timeout_ms,
            debug,
        })
    }
}

/// The value following the option at `i`
fn value_of(args: &[String], i: usize) -> anyhow::Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .with_context(|| format!("Missing value for {}", args[i]))
}

/// Print help information
fn print_help() {
    println!("shellsentry-replay - replay a shell transcript through the runner and detector");
    println!();
    println!("USAGE:");
    println!("    shellsentry-replay [OPTIONS] <TRANSCRIPT>");
    println!();
    println!("OPTIONS:");
    println!("    -c, --command <CMD>       Command text used for classification");
    println!("        --config <PATH>       Path to configuration file");
    println!("    -n, --chunk-size <N>      Bytes per replayed chunk (default 64)");
    println!("        --delay-ms <MS>       Pause between chunks (default 0)");
    println!("    -t, --timeout-ms <MS>     Command timeout");
    println!("    -d, --debug               Enable debug logging");
    println!("    -h, --help                Print this help message");
    println!("    -V, --version             Print version information");
    println!();
    println!("TRANSCRIPT:");
    println!("    {{start}} and {{end}} are replaced by the generated markers.");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                  Set logging level (error, warn, info, debug, trace)");
}

/// Prints surfaced lines, interleaved with detector events as they arrive
struct PrintHooks {
    events: InteractionSubscription,
}

impl PrintHooks {
    fn flush_events(&mut self) {
        while let Some(event) = self.events.try_recv() {
            match serde_json::to_string(&event) {
                Ok(json) => println!("{}", json),
                Err(e) => debug!("Could not encode event: {}", e),
            }
        }
    }
}

impl RunnerHooks for PrintHooks {
    fn on_line(&mut self, line: OutputLine) {
        self.flush_events();
        println!(
            "{}",
            json!({ "line": line.text, "number": line.line_number, "partial": line.partial })
        );
    }

    fn on_completed(&mut self, _result: &shellsentry::CommandResult) {
        self.flush_events();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ReplayArgs::parse().unwrap_or_else(|e| {
        eprintln!("Failed to parse arguments: {}", e);
        print_help();
        process::exit(1);
    });

    let log_level = if args.debug { "debug" } else { "info" };
    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from(env_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    info!("Starting shellsentry-replay v{}", shellsentry::VERSION);

    let config = match &args.config_path {
        Some(path) => ConfigLoader::load_from_path(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => shellsentry::load_config(),
    };
    config.validate()?;

    let transcript = std::fs::read_to_string(&args.transcript)
        .with_context(|| format!("Failed to read {}", args.transcript.display()))?;

    let runner = CommandRunner::new(config.runner.clone());
    let context = runner.prepare(&args.command, args.timeout_ms)?;
    let transcript = transcript
        .replace("{start}", &context.markers.start)
        .replace("{end}", &context.markers.end);

    let (mut session, peer) = SessionStream::pair();
    let (output_tx, mut input_rx) = peer.into_parts();
    let chunk_size = args.chunk_size;
    let delay = Duration::from_millis(args.delay_ms);

    let feeder = tokio::spawn(async move {
        // Nothing is echoed until the command is written.
        if input_rx.recv().await.is_none() {
            return;
        }
        for chunk in transcript.as_bytes().chunks(chunk_size) {
            if output_tx.send(chunk.to_vec()).is_err() {
                return;
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        debug!("Transcript replayed");
        // Hold the session open until the runner lets go of it.
        while input_rx.recv().await.is_some() {}
    });

    let bus = InteractionEventBus::default();
    let mut hooks = PrintHooks {
        events: bus.subscribe_ordered(),
    };
    let detector = DetectorHandle::spawn(
        InteractionDetector::new(
            context.command_id.clone(),
            context.task_id.clone(),
            &context.command,
            Taxonomy::for_config(&config.detector),
            config.detector.clone(),
            bus,
        ),
        config.detector.tick_interval(),
    );

    let result = runner
        .run(&mut session, context, &mut hooks, Some(&detector))
        .await;
    hooks.flush_events();
    println!("{}", json!({ "result": result }));

    drop(session);
    feeder.await.context("Transcript feeder failed")?;
    Ok(())
}
