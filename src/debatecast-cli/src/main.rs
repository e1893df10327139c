//! DebateCast CLI - AI Debate Video Generator
//!
//! Generates a lip-synced debate video from a topic, either once from the
//! terminal or behind a small HTTP API.

mod server;

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use debatecast_core::{Config, DebateEvent, DebateGenerator, default_config};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "debatecast",
    version,
    about = "AI Debate Video Generator - Watch AIs debate on camera",
    long_about = "Generates argument text, speech and lip-synced clips for each debate turn and stitches them into one video."
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a single debate video
    Generate {
        /// The topic to debate
        #[arg(value_name = "TOPIC")]
        topic: String,

        /// Number of debate rounds (each round is one pro and one con turn)
        #[arg(short, long, default_value = "2", value_name = "ROUNDS")]
        rounds: u32,

        /// Directory for the final video
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Lip-sync service URL (overrides config and LIPSYNC_URL)
        #[arg(long, value_name = "URL")]
        lipsync_url: Option<String>,
    },
    /// Serve the generator over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8000", value_name = "ADDR")]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };
    apply_env_overrides(&mut config);

    match cli.command {
        Command::Generate {
            topic,
            rounds,
            output,
            lipsync_url,
        } => {
            if let Some(dir) = output {
                config.output.dir = dir;
            }
            if let Some(url) = lipsync_url {
                config.services.lipsync_url = url;
            }
            run_generate(config, &topic, rounds).await
        }
        Command::Serve { bind } => server::serve(config, bind).await,
    }
}

/// Logs go to stderr via tracing; `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Environment takes precedence over the config file for endpoints and secrets.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(base) = env::var("OPENAI_API_BASE").or_else(|_| env::var("OPENAI_BASE_URL")) {
        config.services.api_base = base;
    }
    if let Ok(key) = env::var("OPENAI_API_KEY") {
        config.services.api_key = key;
    }
    if let Ok(url) = env::var("LIPSYNC_URL") {
        config.services.lipsync_url = url;
    }
    if let Ok(verify) = env::var("LIPSYNC_VERIFY_TLS") {
        config.services.verify_tls = parse_flag(&verify);
    }
}

/// `0`, `false` and `no` disable; anything else enables.
fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "0" | "false" | "no")
}

/// Cap requested rounds at the configured maximum.
pub(crate) fn clamp_rounds(requested: u32, max_rounds: u32) -> u32 {
    requested.min(max_rounds.max(1))
}

async fn run_generate(
    config: Config,
    topic: &str,
    requested_rounds: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let rounds = clamp_rounds(requested_rounds, config.output.max_rounds);
    if rounds < requested_rounds {
        eprintln!(
            "{}",
            format!(
                "Warning: Rounds reduced to maximum of {} (was {}).",
                rounds, requested_rounds
            )
            .yellow()
        );
    }

    // Print header
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  DebateCast - Debate Video Generator".bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), topic.bright_white());
    println!("{} {}", "Rounds:".bold(), rounds);
    println!(
        "{} {}",
        "Lip-sync:".bold(),
        config.services.lipsync_url.dimmed()
    );
    println!();
    println!("{}", "─".repeat(70).dimmed());

    let generator = DebateGenerator::from_config(&config)
        .await?
        .with_callback(create_console_callback());

    match generator.generate_debate(topic, rounds).await {
        Ok(result) => {
            println!();
            println!("{}", "═".repeat(70).bright_blue());
            println!("{}", "  Debate video ready.".bright_green().bold());
            println!("{}", "═".repeat(70).bright_blue());
            println!("{} {}", "Video:".bold(), result.video_path.display());
            println!("{} {}", "Session:".bold(), result.session_id.dimmed());
            println!(
                "{} {} of {} turns",
                "Clips:".bold(),
                result.clip_ids.len(),
                result.planned_turns
            );
            println!();
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {} [{}]", "Error:".red().bold(), e, e.kind());
            std::process::exit(1);
        }
    }
}

/// Create a callback that prints debate events to the console.
fn create_console_callback() -> Box<dyn Fn(DebateEvent) + Send + Sync> {
    Box::new(move |event| match event {
        DebateEvent::DebateStart { session_id, turns, .. } => {
            println!(
                "{} {} turns planned (session {})",
                "▶".bright_cyan(),
                turns,
                session_id.dimmed()
            );
        }
        DebateEvent::TurnStart { turn_id, role } => {
            println!(
                "{} {} {}",
                "▶".bright_cyan(),
                turn_id.bright_cyan().bold(),
                format!("({})", role.stance()).yellow()
            );
        }
        DebateEvent::TextReady {
            content, fallback, ..
        } => {
            if fallback {
                println!("  {}", "[fallback argument]".yellow());
            }
            let wrapped = textwrap(&content, 66);
            for line in wrapped.lines() {
                println!("  {}", line);
            }
            println!();
        }
        DebateEvent::ClipReady { turn_id, .. } => {
            println!("  {} {}", "✔".green(), format!("clip {} ready", turn_id).green());
        }
        DebateEvent::TurnDropped {
            turn_id,
            stage,
            reason,
        } => {
            println!(
                "  {} {}",
                "✘".red(),
                format!("{} dropped at {} stage: {}", turn_id, stage, reason).red()
            );
        }
        DebateEvent::Assembling { clips } => {
            println!();
            println!(
                "{} {}",
                "▶".bright_magenta(),
                format!("Assembling {} clips...", clips).bright_magenta()
            );
        }
        DebateEvent::DebateEnd { .. } => {
            // Handled in run_generate
        }
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
