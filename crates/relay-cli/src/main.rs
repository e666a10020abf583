use std::fs::File;
use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use relay_core::cleaner::strip_action_with;
use relay_core::config::Config;
use relay_core::detector::DetectorOptions;
use relay_core::transcript::replay_sessions;
use relay_core::transcript::TranscriptStore;
use relay_transport::dispatcher::Dispatch;
use relay_transport::dispatcher::StreamDispatcher;
use relay_transport::dispatcher::Viewer;
use relay_transport::source::read_envelopes;
use tracing::info;
use tracing::warn;

mod render;

use render::OutputSink;

#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to the user config dir's relay/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSONL recording of WebSocket envelopes through the stream pipeline.
    Feed {
        /// Recording to read, or `-` for stdin.
        #[arg(default_value = "-")]
        input: String,
        /// Only accept envelopes for this thread.
        #[arg(long)]
        thread: Option<String>,
        /// Client id of the user message being answered.
        #[arg(long)]
        client: Option<String>,
        /// This view's device id; owner echoes from other devices are dropped.
        #[arg(long)]
        device: Option<String>,
        /// Signed-in user id of the viewer.
        #[arg(long)]
        user: Option<String>,
        /// Guest id of the viewer.
        #[arg(long)]
        guest: Option<String>,
        /// Append session lifecycle events to this transcript.
        #[arg(long)]
        record: Option<PathBuf>,
        /// Simulate the user pressing stop after this many accepted chunks.
        #[arg(long)]
        stop_after: Option<usize>,
        /// Print only outcomes, not per-chunk display updates.
        #[arg(short, long)]
        quiet: bool,
    },
    /// Print text with any trailing action block removed.
    Strip {
        text: String,
    },
    /// Summarise the sessions stored in a transcript.
    History {
        transcript: PathBuf,
    },
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let json_logging = std::env::var("RELAY_LOG_JSON")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(false);
    let env_filter = tracing_subscriber::EnvFilter::try_from_env("RELAY_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relay=info"));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .with_writer(io::stderr)
            .init();
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Feed {
            input,
            thread,
            client,
            device,
            user,
            guest,
            record,
            stop_after,
            quiet,
        } => feed(
            config,
            FeedOptions {
                input,
                thread,
                client,
                viewer: Viewer {
                    device_id: device,
                    user_id: user,
                    guest_id: guest,
                },
                record,
                stop_after,
                quiet,
            },
        ),
        Command::Strip { text } => {
            let options = DetectorOptions {
                marker: config.stream.marker.as_str(),
                allow_arrays: config.stream.allow_array_actions,
            };
            println!("{}", strip_action_with(&text, options));
            Ok(())
        }
        Command::History { transcript } => history(&transcript),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    if let Some(path) = explicit {
        return Ok(Config::load(path)?);
    }
    match dirs::config_dir() {
        Some(dir) => Ok(Config::load_or_default(dir.join("relay").join("config.toml"))?),
        None => Ok(Config::default()),
    }
}

struct FeedOptions {
    input: String,
    thread: Option<String>,
    client: Option<String>,
    viewer: Viewer,
    record: Option<PathBuf>,
    stop_after: Option<usize>,
    quiet: bool,
}

fn feed(config: Config, options: FeedOptions) -> Result<(), Box<dyn std::error::Error>> {
    let reader: Box<dyn BufRead> = if options.input == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(File::open(&options.input)?))
    };
    let transcript = options.record.as_ref().map(TranscriptStore::open).transpose()?;

    let sink = OutputSink::new(io::stdout().lock(), options.quiet, transcript);
    let mut dispatcher = StreamDispatcher::new(config.stream, sink)
        .with_thread(options.thread)
        .with_viewer(options.viewer);
    dispatcher.begin(options.client);

    let mut accepted = 0usize;
    let mut stopped = false;
    let delivered = read_envelopes(reader, |envelope| {
        let dispatch = dispatcher.handle(&envelope);
        if matches!(dispatch, Dispatch::Handled(ref effects) if !effects.is_empty()) {
            accepted += 1;
        }
        if !stopped && options.stop_after.is_some_and(|limit| accepted >= limit) {
            stopped = true;
            if let Some(request) = dispatcher.stop() {
                dispatcher
                    .sink_mut()
                    .write_value(&render::stop_value(&request));
            }
        }
    })?;

    if dispatcher.accumulator().state().is_streaming() {
        warn!("recording ended mid-stream");
        dispatcher.connection_lost("input ended before stream_complete");
    }
    info!(delivered, accepted, "feed finished");

    dispatcher.into_sink().finish()?;
    Ok(())
}

fn history(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = TranscriptStore::open(path)?;
    let records = store.load()?;
    for summary in replay_sessions(&records) {
        println!("{}", render::session_value(&summary));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn feed_accepts_global_config_after_subcommand() {
        let cli = Cli::try_parse_from([
            "relay",
            "feed",
            "session.jsonl",
            "--thread",
            "t1",
            "--stop-after",
            "3",
            "--config",
            "relay.toml",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("relay.toml")));
        match cli.command {
            Command::Feed {
                input,
                thread,
                stop_after,
                quiet,
                ..
            } => {
                assert_eq!(input, "session.jsonl");
                assert_eq!(thread.as_deref(), Some("t1"));
                assert_eq!(stop_after, Some(3));
                assert!(!quiet);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
