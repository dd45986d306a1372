//! Repwatch CLI
//!
//! Usage:
//!   repwatch --rule curl.json --frames session.jsonl   # Replay keypoint frames
//!   repwatch --rule curl.json                          # Read frames from stdin (JSON lines)
//!   repwatch --serve                                   # HTTP API server
//!   repwatch --stream http://scorer:8000 --images dir/ # Stream frames to a remote scorer
//!   repwatch --rule curl.json --frames f.jsonl --json  # JSON output

use clap::Parser;
use std::io::{self, BufRead, BufReader};
use std::time::Duration;
use tracing::warn;

use repwatch::core::{
    run_server, DirectoryFrameSource, EngineConfig, HttpScorer, RepSession, RuleEvaluator,
    StreamSnapshot, StreamingClient,
};
use repwatch::types::{EngineError, FrameOutput, KeypointFrame, Phase, SessionAction, Thresholds};
use repwatch::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "repwatch",
    version = VERSION,
    about = "Repwatch - count exercise repetitions from pose keypoints",
    long_about = "Repwatch detects completed exercise repetitions in a stream of\n\
                  pose keypoints using debounced geometric rules, or relays the\n\
                  count of a remote DTW-style matcher.\n\n\
                  Modes:\n  \
                  --rule [--frames]  Replay keypoint frames (file or stdin)\n  \
                  --serve            HTTP API server mode\n  \
                  --stream           Stream images to a remote scorer\n\n\
                  Phases:\n  \
                  WAITING_ENTER - waiting for the rule to hold\n  \
                  WAITING_EXIT  - in position, waiting for release"
)]
struct Args {
    /// Rule file (JSON record)
    #[arg(short, long)]
    rule: Option<String>,

    /// Keypoint frames, one JSON frame per line (default: stdin)
    #[arg(short, long)]
    frames: Option<String>,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Stream to the remote scorer at this base URL
    #[arg(long)]
    stream: Option<String>,

    /// Directory of encoded frames to stream
    #[arg(long)]
    images: Option<String>,

    /// Stop streaming after this many seconds (default: until Ctrl-C)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Manual enter threshold, sent once with the first streamed frame
    #[arg(long, requires = "exit")]
    enter: Option<f64>,

    /// Manual exit threshold, sent once with the first streamed frame
    #[arg(long, requires = "enter")]
    exit: Option<f64>,

    /// Config file (TOML)
    #[arg(long)]
    config: Option<String>,

    /// Override capture tick (milliseconds)
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Override the in-flight request cap
    #[arg(long)]
    cap: Option<usize>,

    /// Stop the session once this many reps are counted
    #[arg(long)]
    target: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Print every frame, not only completed reps
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    repwatch::init_tracing("repwatch=info");
    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("repwatch: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), EngineError> {
    let config = load_config(&args)?;

    if args.serve {
        print_header("API Server", args.no_color);
        run_server(&args.addr, config).await
    } else if let Some(ref url) = args.stream {
        run_stream(url, &args, config).await
    } else if let Some(ref rule) = args.rule {
        run_replay(rule, &args, &config)
    } else {
        Err(EngineError::Config(
            "nothing to do: pass --rule, --serve or --stream (see --help)".to_string(),
        ))
    }
}

/// Config file first, then CLI overrides
fn load_config(args: &Args) -> Result<EngineConfig, EngineError> {
    let mut config = match args.config {
        Some(ref path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(tick) = args.tick_ms {
        config.tick_interval_ms = tick;
    }
    if let Some(cap) = args.cap {
        config.in_flight_cap = cap;
    }
    if let Some(ref url) = args.stream {
        config.scorer_url = Some(url.clone());
    }
    config.validate()
}

/// Replay keypoint frames through the local engine
fn run_replay(rule_path: &str, args: &Args, config: &EngineConfig) -> Result<(), EngineError> {
    let rule_json = std::fs::read_to_string(rule_path)?;
    let mut session = RepSession::local(RuleEvaluator::with_confidence_floor(config.confidence_floor))
        .with_target(args.target);
    session.activate_json(&rule_json)?;
    session.apply(SessionAction::Start)?;

    let reader: Box<dyn BufRead> = match args.frames {
        Some(ref path) => Box::new(BufReader::new(std::fs::File::open(path)?)),
        None => {
            if !args.json {
                print_header("Replay (stdin)", args.no_color);
                println!("One JSON keypoint frame per line. Ctrl-D to finish.");
                println!();
            }
            Box::new(BufReader::new(io::stdin()))
        }
    };

    let mut frames = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let frame: KeypointFrame = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping malformed frame");
                continue;
            }
        };

        let output = session.process(&frame)?;
        frames += 1;
        print_frame(&output, args);

        if !session.state().accepts_frames() {
            break;
        }
    }

    if args.json {
        let summary = serde_json::json!({
            "frames": frames,
            "reps": session.count(),
            "state": session.state(),
        });
        println!("{}", summary);
    } else {
        let state = if args.no_color {
            session.state().to_string()
        } else {
            session.state().to_terminal_string()
        };
        println!("\nSession ended. Frames: {} | Reps: {} | State: {}", frames, session.count(), state);
    }
    Ok(())
}

/// Stream encoded frames to the remote scorer until Ctrl-C or the deadline
async fn run_stream(url: &str, args: &Args, config: EngineConfig) -> Result<(), EngineError> {
    let images = args
        .images
        .as_deref()
        .ok_or_else(|| EngineError::Config("--stream needs --images <dir>".to_string()))?;

    let scorer = HttpScorer::new(url, config.request_timeout())?;
    let source = DirectoryFrameSource::open(images)?;
    let mut client = StreamingClient::new(scorer, &config);
    if let (Some(enter), Some(exit)) = (args.enter, args.exit) {
        client = client.with_manual_override(Thresholds::new(enter, exit));
    }

    if !args.json {
        print_header("Streaming", args.no_color);
        println!("Scorer: {} | frames: {} | tick: {} ms | cap: {}", url, source.len(), config.tick_interval_ms, config.in_flight_cap);
        println!();
    }

    let handle = client.start(source).await?;

    let mut updates = handle.subscribe();
    let mut last_count = 0u64;
    let deadline = tokio::time::sleep(args.duration_secs.map_or(Duration::MAX, Duration::from_secs));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.count != last_count {
                    last_count = snapshot.count;
                    print_snapshot(&snapshot, args);
                }
            }
        }
    }

    let last = handle.join().await;
    if args.json {
        println!("{}", serde_json::to_string(&last).unwrap_or_default());
    } else {
        println!(
            "\nStream ended. Reps: {} | dispatched: {} | dropped: {} | failed: {} | stale: {}",
            last.count, last.dispatched, last.dropped, last.failed, last.stale
        );
    }
    Ok(())
}

/// Print header
fn print_header(mode: &str, no_color: bool) {
    if no_color {
        println!("========================================");
        println!("  Repwatch v{} - {}", VERSION, mode);
        println!("========================================");
    } else {
        println!("\x1b[1m========================================\x1b[0m");
        println!("\x1b[1m  Repwatch v{} - {}\x1b[0m", VERSION, mode);
        println!("\x1b[1m========================================\x1b[0m");
    }
    println!();
}

fn print_frame(output: &FrameOutput, args: &Args) {
    if !(args.verbose || output.completed) {
        return;
    }
    if args.json {
        println!("{}", serde_json::to_string(output).unwrap_or_default());
    } else if args.no_color {
        println!("{}", output.to_parseable_string());
    } else {
        println!("{}", output.to_terminal_string());
        if output.completed {
            println!("\x1b[32m  ✓ REP {}\x1b[0m", output.count);
        }
    }
}

fn print_snapshot(snapshot: &StreamSnapshot, args: &Args) {
    if args.json {
        println!("{}", serde_json::to_string(snapshot).unwrap_or_default());
        return;
    }
    let distance = snapshot
        .last_distance
        .map_or_else(|| "-".to_string(), |d| format!("{:.3}", d));
    let (color, reset) = if args.no_color {
        ("", "")
    } else {
        ("\x1b[32m", Phase::color_reset())
    };
    println!(
        "{}reps={} | distance={} | in_flight={} | mode={:?}{}",
        color, snapshot.count, distance, snapshot.in_flight, snapshot.threshold_mode, reset
    );
}
