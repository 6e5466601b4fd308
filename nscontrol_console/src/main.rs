//! # nscontrol console
//!
//! External controller for the nscontrol shared arena. Attaches with the
//! same facade as the engine and exposes the command channels and the state
//! store on the command line.
//!
//! # Usage
//!
//! ```bash
//! # Arena usage and connected clients
//! nscontrol_console status
//!
//! # Send a command to the engine
//! nscontrol_console send "flyto mars"
//!
//! # Follow everything addressed to consoles, including the realtime ring
//! nscontrol_console listen --rt
//!
//! # Change settings and publish them
//! nscontrol_console set settings '{"field_of_view": 30.0}' --publish
//!
//! # Remove an arena left behind by crashed processes
//! nscontrol_console purge
//! ```

#![deny(warnings)]

mod commands;

use clap::{Parser, Subcommand};
use commands::List;
use nscontrol::{Category, Control, ShmControl, Side, remove_arena};
use nscontrol_common::config::{ConfigLoader, LogLevel, NsControlConfig, SegmentConfig};
use nscontrol_common::shm::layout::ClientType;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};

/// nscontrol console - drive a running planetarium through shared memory
#[derive(Parser, Debug)]
#[command(name = "nscontrol_console")]
#[command(version)]
#[command(about = "External controller attaching to the nscontrol shared arena")]
#[command(long_about = None)]
struct Args {
    /// Path to configuration file (TOML with [shared] and [segment])
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Arena name, overrides the configuration file
    #[arg(short, long)]
    name: Option<String>,

    /// Client type this console registers as
    #[arg(long, default_value = "console")]
    client_type: ClientType,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print arena usage and connected clients
    Status,
    /// Broadcast a command on the queue channel
    Send {
        /// Command text
        text: String,
    },
    /// Push a command on the realtime ring
    SendRt {
        /// Command text
        text: String,
    },
    /// Print incoming commands until Ctrl-C
    Listen {
        /// Poll interval when idle
        #[arg(long, default_value_t = 10)]
        interval_ms: u64,
        /// Also drain the realtime ring
        #[arg(long)]
        rt: bool,
    },
    /// Print state records as JSON
    State {
        /// Category to print; all when omitted
        category: Option<Category>,
        /// Show the unpublished write side
        #[arg(long)]
        pending: bool,
    },
    /// Merge a JSON delta into one category
    Set {
        /// Category to update
        category: Category,
        /// Partial record as JSON, e.g. '{"latitude": 48.8}'
        delta: String,
        /// Publish after merging
        #[arg(long)]
        publish: bool,
    },
    /// Copy the write side of the state store to the read side
    Publish,
    /// Print or replace the language list
    Languages {
        /// New list, comma or newline separated
        #[arg(long)]
        set: Option<String>,
    },
    /// Print or replace the landscape list
    Landscapes {
        /// New list, comma or newline separated
        #[arg(long)]
        set: Option<String>,
    },
    /// Remove the named arena without attaching
    Purge,
}

fn main() {
    if let Err(e) = run() {
        error!("console failed: {}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (segment, level) = load_config(&args)?;
    setup_tracing(level, args.json);

    info!(arena = %segment.name, "nscontrol console v{}", env!("CARGO_PKG_VERSION"));

    if let Command::Purge = args.command {
        if remove_arena(&segment)? {
            println!("removed {}", segment.path().display());
        } else {
            println!("no arena at {}", segment.path().display());
        }
        return Ok(());
    }

    let control = ShmControl::open(&segment, args.client_type)?;

    match args.command {
        Command::Status => commands::status(&control)?,
        Command::Send { text } => {
            commands::send(&control, &text)?;
        }
        Command::SendRt { text } => {
            commands::send_rt(&control, &text)?;
        }
        Command::Listen { interval_ms, rt } => {
            let running = Arc::new(AtomicBool::new(true));
            let flag = Arc::clone(&running);
            ctrlc::set_handler(move || {
                info!("Received shutdown signal");
                flag.store(false, Ordering::SeqCst);
            })?;
            let printed =
                commands::listen(&control, running, Duration::from_millis(interval_ms), rt)?;
            info!(printed, "listener stopped");
        }
        Command::State { category, pending } => {
            let side = if pending { Side::Write } else { Side::Read };
            let value = commands::state_json(&control, category, side)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Set {
            category,
            delta,
            publish,
        } => {
            let applied = commands::apply_delta(&control, category, &delta)?;
            if publish {
                control.publish()?;
            }
            println!(
                "{applied} field(s) written{}",
                if publish { ", published" } else { "" }
            );
        }
        Command::Publish => control.publish()?,
        Command::Languages { set } => {
            commands::list(&control, List::Languages, set.as_deref())?;
        }
        Command::Landscapes { set } => {
            commands::list(&control, List::Landscapes, set.as_deref())?;
        }
        Command::Purge => {}
    }

    control.close()?;
    Ok(())
}

/// Arena settings and log level from the config file (if any) and the
/// command line. `--verbose` forces debug logging.
fn load_config(args: &Args) -> Result<(SegmentConfig, LogLevel), Box<dyn std::error::Error>> {
    let (mut segment, level) = match &args.config {
        Some(path) => {
            let config = NsControlConfig::load(path)?;
            config.validate()?;
            (config.segment, config.shared.log_level)
        }
        None => (SegmentConfig::default(), LogLevel::Warn),
    };
    if let Some(name) = &args.name {
        segment.name = name.clone();
    }
    segment.validate()?;
    let level = if args.verbose { LogLevel::Debug } else { level };
    Ok((segment, level))
}

/// Setup tracing subscriber; `RUST_LOG` overrides `level`.
fn setup_tracing(level: LogLevel, json: bool) {
    let filter = nscontrol::log_filter(level);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_set_with_publish() {
        let args = Args::try_parse_from([
            "nscontrol_console",
            "--client-type",
            "external",
            "set",
            "observer",
            r#"{"latitude": 1.5}"#,
            "--publish",
        ])
        .unwrap();
        assert_eq!(args.client_type, ClientType::External);
        match args.command {
            Command::Set {
                category, publish, ..
            } => {
                assert_eq!(category, Category::Observer);
                assert!(publish);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_category() {
        assert!(Args::try_parse_from(["nscontrol_console", "state", "stars"]).is_err());
    }

    #[test]
    fn test_name_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[shared]\nservice_name = \"console\"\n\n[segment]\nname = \"from_file\"\nattach_timeout_ms = 500"
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let args = Args::try_parse_from(["nscontrol_console", "-c", path, "status"]).unwrap();
        let (segment, _) = load_config(&args).unwrap();
        assert_eq!(segment.name, "from_file");
        assert_eq!(segment.attach_timeout_ms, 500);

        let args =
            Args::try_parse_from(["nscontrol_console", "-c", path, "-n", "override", "status"])
                .unwrap();
        assert_eq!(load_config(&args).unwrap().0.name, "override");
    }

    #[test]
    fn test_log_level_from_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[shared]\nlog_level = \"error\"\nservice_name = \"console\"\n\n[segment]\nname = \"levels\""
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let args = Args::try_parse_from(["nscontrol_console", "-c", path, "status"]).unwrap();
        assert_eq!(load_config(&args).unwrap().1, LogLevel::Error);

        let args = Args::try_parse_from(["nscontrol_console", "-c", path, "-v", "status"]).unwrap();
        assert_eq!(load_config(&args).unwrap().1, LogLevel::Debug);

        let args = Args::try_parse_from(["nscontrol_console", "status"]).unwrap();
        assert_eq!(load_config(&args).unwrap().1, LogLevel::Warn);
    }

    #[test]
    fn test_invalid_name_rejected() {
        let args = Args::try_parse_from(["nscontrol_console", "-n", "a/b", "status"]).unwrap();
        assert!(load_config(&args).is_err());
    }
}
