//! Chat monitor (chatguard) - terminal driver
//!
//! Reads `Sender: text` lines from stdin and feeds them to a monitoring
//! session. Classifier verdicts are printed as they arrive; slash commands
//! control the session:
//!
//! - `/pause`, `/resume`, `/toggle`: gate what is shown
//! - `/reset`: clear the conversation and today's alerts
//! - `/export [path]`: write a plain-text report
//! - `/status`, `/alerts`: print the status board or alert feed
//! - `/quit`: stop the session and exit

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chatguard_common::config::{ConfigOverrides, ConfigResolver};
use chatguard_monitor::{MonitoringController, PollReport};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for chatguard
#[derive(Parser, Debug)]
#[command(name = "chatguard")]
#[command(about = "Conversation monitor backed by a remote sentiment classifier")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "CHATGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the sentiment classifier
    #[arg(long)]
    server_url: Option<String>,

    /// Messages per analysis window
    #[arg(short, long)]
    window_size: Option<usize>,

    /// Timeout for a single classifier call, in seconds
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Directory holding the daily alert files
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    /// Directory receiving exported reports
    #[arg(long)]
    export_dir: Option<PathBuf>,
}

/// One line of operator input
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Message { sender: String, text: String },
    Pause,
    Resume,
    Toggle,
    Reset,
    Export(Option<PathBuf>),
    Status,
    Alerts,
    Quit,
    Blank,
    Unrecognized(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }

    if let Some(command) = line.strip_prefix('/') {
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        return match name {
            "pause" => Input::Pause,
            "resume" => Input::Resume,
            "toggle" => Input::Toggle,
            "reset" => Input::Reset,
            "export" if arg.is_empty() => Input::Export(None),
            "export" => Input::Export(Some(PathBuf::from(arg))),
            "status" => Input::Status,
            "alerts" => Input::Alerts,
            "quit" | "exit" => Input::Quit,
            _ => Input::Unrecognized(line.to_string()),
        };
    }

    match line.split_once(':') {
        Some((sender, text)) if !sender.trim().is_empty() && !text.trim().is_empty() => {
            Input::Message {
                sender: sender.trim().to_string(),
                text: text.trim().to_string(),
            }
        }
        _ => Input::Unrecognized(line.to_string()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        server_url: args.server_url.clone(),
        window_size: args.window_size,
        request_timeout_secs: args.request_timeout_secs,
        logs_dir: args.logs_dir.clone(),
        export_dir: args.export_dir.clone(),
    };
    let config = ConfigResolver::new(args.config.clone())
        .resolve(&overrides)
        .context("Failed to resolve configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "chatguard={lvl},chatguard_monitor={lvl},chatguard_common={lvl}",
                    lvl = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting chatguard v{}", env!("CARGO_PKG_VERSION"));
    info!("Classifier: {}", config.server_url);
    info!("Alert logs: {}", config.logs_dir.display());

    let poll_interval = config.poll_interval;
    let drain_limit = config.request_timeout + config.shutdown_grace;

    let mut controller =
        MonitoringController::start_http(config).context("Failed to start monitoring session")?;

    for alert in controller.feed().iter().rev() {
        print!("{}", alert.render());
    }

    let (line_tx, line_rx) = mpsc::channel::<String>();
    std::thread::Builder::new()
        .name("chatguard-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    loop {
        match line_rx.recv_timeout(poll_interval) {
            Ok(line) => {
                if !handle_input(&mut controller, parse_input(&line)) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("Input closed");
                drain_outstanding(&mut controller, poll_interval, drain_limit);
                break;
            }
        }

        let report = controller.poll_completions();
        show_report(&controller, &report);
    }

    controller.stop();
    info!("chatguard stopped");
    Ok(())
}

/// Apply one input line; returns false when the session should end
fn handle_input(controller: &mut MonitoringController, input: Input) -> bool {
    match input {
        Input::Message { sender, text } => {
            if let Err(e) = controller.on_new_message(&sender, &text) {
                warn!("Message rejected: {}", e);
            }
        }
        Input::Pause => report_err(controller.pause(), "pause"),
        Input::Resume => report_err(controller.resume(), "resume"),
        Input::Toggle => match controller.toggle_monitoring() {
            Ok(active) => println!("Monitoring {}", if active { "active" } else { "paused" }),
            Err(e) => warn!("Toggle failed: {}", e),
        },
        Input::Reset => {
            report_err(controller.reset(), "reset");
            println!("Monitoring reset");
        }
        Input::Export(path) => match controller.export(path.as_deref()) {
            Ok((path, bytes)) => println!("Exported {} bytes to {}", bytes, path.display()),
            Err(e) => println!("Export failed: {}", e),
        },
        Input::Status => {
            for (party, status) in controller.snapshot().statuses {
                println!(
                    "{:<12} {:<11} {:?}",
                    party,
                    status.sentiment.as_str(),
                    status.level
                );
            }
        }
        Input::Alerts => {
            for alert in controller.feed() {
                print!("{}", alert.render());
            }
        }
        Input::Quit => return false,
        Input::Blank => {}
        Input::Unrecognized(line) => println!("Unrecognized input: {}", line),
    }
    true
}

fn report_err(result: chatguard_monitor::Result<()>, action: &str) {
    if let Err(e) = result {
        warn!("{} failed: {}", action, e);
    }
}

fn show_report(controller: &MonitoringController, report: &PollReport) {
    if controller.state().active {
        for alert in &report.alerts {
            print!("{}", alert.render());
        }
    }
    for e in &report.persistence_errors {
        println!("Warning: alert not saved: {}", e);
    }
}

/// Give the last analysis a chance to land before shutting down
fn drain_outstanding(controller: &mut MonitoringController, poll_interval: Duration, limit: Duration) {
    let deadline = Instant::now() + limit;
    while controller.outstanding().is_some() && Instant::now() < deadline {
        std::thread::sleep(poll_interval);
        let report = controller.poll_completions();
        show_report(controller, &report);
    }
}
