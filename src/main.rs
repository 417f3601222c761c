// SPDX-License-Identifier: Apache-2.0 OR MIT
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use logflow::config::Config;
use logflow::logging::{
    Hints, Level, LogEvent, LogSink, NullSink, Pipeline, StderrSink, StdoutSink,
};
use logflow::sampling::{context, SeededRandom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Request paths cycled through by the generator
const PATHS: [&str; 4] = ["/api/orders", "/api/users/42", "/health/live", "/static/app.css"];

/// Loggers cycled through by the generator
const LOGGERS: [&str; 3] = ["app.http", "app.db", "com.noisy.Poller"];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug, PartialEq)]
enum Command {
    /// Parse and validate a configuration file, then print it normalized
    Check {
        /// Path to a JSON5 configuration file
        config: PathBuf,
    },
    /// Push synthetic events through the pipeline and print the final stats
    Generate {
        /// Path to a JSON5 configuration file (defaults when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of producer threads
        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// Events per producer thread
        #[arg(long, default_value_t = 100_000)]
        events: u64,

        /// Events per simulated request (one sampling context each)
        #[arg(long, default_value_t = 20)]
        request_size: u64,

        /// Where delivered events go
        #[arg(long, value_enum, default_value_t = SinkKind::Null)]
        sink: SinkKind,

        /// Seed for reproducible sampling decisions
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    Null,
    Stdout,
    Stderr,
}

impl SinkKind {
    fn build(self) -> Box<dyn LogSink> {
        match self {
            SinkKind::Null => Box::new(NullSink),
            SinkKind::Stdout => Box::new(StdoutSink::new()),
            SinkKind::Stderr => Box::new(StderrSink::new()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Check { config } => {
            let config = load_config(Some(&config))?;
            println!("{}", config.to_json5());
        }
        Command::Generate {
            config,
            threads,
            events,
            request_size,
            sink,
            seed,
        } => {
            let config = load_config(config.as_ref())?;
            let settings = GenerateSettings {
                threads: threads.max(1),
                events,
                request_size: request_size.max(1),
                sink,
                seed,
            };
            generate(config, settings).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

struct GenerateSettings {
    threads: usize,
    events: u64,
    request_size: u64,
    sink: SinkKind,
    seed: Option<u64>,
}

async fn generate(config: Config, settings: GenerateSettings) -> Result<()> {
    let mut builder = Pipeline::builder(config).sink(settings.sink.build());
    if let Some(seed) = settings.seed {
        builder = builder.random(Arc::new(SeededRandom::new(seed)));
    }

    let pipeline = Arc::new(builder.build()?);
    pipeline.start()?;

    let started = Instant::now();
    let producers: Vec<_> = (0..settings.threads)
        .map(|id| {
            let pipeline = Arc::clone(&pipeline);
            let events = settings.events;
            let request_size = settings.request_size;
            // Producers may block under the BLOCK policy, keep them off the runtime
            tokio::task::spawn_blocking(move || produce(&pipeline, id, events, request_size))
        })
        .collect();

    for producer in producers {
        producer.await.context("producer task failed")?;
    }

    pipeline.shutdown();
    let elapsed = started.elapsed();

    let stats = pipeline.stats();
    stats.publish();
    tracing::info!(
        elapsed_ms = elapsed.as_millis() as u64,
        "generated {} events",
        stats.buffered_events + stats.sampling_dropped_events
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn produce(pipeline: &Pipeline, id: usize, events: u64, request_size: u64) {
    let mut sent = 0;
    while sent < events {
        // One sampling context per simulated request
        let _request = context::initialize_context();
        let path = PATHS[(sent / request_size) as usize % PATHS.len()];

        for _ in 0..request_size.min(events - sent) {
            let level = level_for(sent);
            let logger = LOGGERS[sent as usize % LOGGERS.len()];
            let event = LogEvent::new(level, logger, format!("producer {} event {}", id, sent));
            pipeline.append_with(event, Hints::path(path));
            sent += 1;
        }
    }
}

/// Mostly INFO and DEBUG with a sprinkling of WARN and ERROR
fn level_for(n: u64) -> Level {
    match n % 100 {
        0 => Level::Error,
        1..=4 => Level::Warn,
        5..=44 => Level::Info,
        45..=84 => Level::Debug,
        _ => Level::Trace,
    }
}
