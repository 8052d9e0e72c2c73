//! Chronicle inspection CLI
//!
//! Read-only consumers of the persisted artifacts; no live dispatcher or
//! network connection involved.
//!
//! - `chronicle dump`: decode the chain log, filter, render table/JSON/CSV
//! - `chronicle state`: reconstruct and print a delta store snapshot
//! - `chronicle verify`: walk the whole chain and report integrity
//! - `chronicle rebuild`: regenerate the mirror and counters from the chain

mod format;

use std::io::Write;
use std::process;

use clap::{Arg, ArgAction, ArgMatches, Command};

use chronicle_chain::{ChainError, ChainLog};
use chronicle_core::{DispatchConfig, Event};
use chronicle_delta::DeltaStore;
use chronicle_dispatch::rebuild;

use format::{render_csv, render_json, render_snapshot, render_table};

fn build_cli() -> Command {
    let root = Arg::new("root")
        .long("root")
        .value_name("DIR")
        .default_value(".chronicle")
        .help("Base directory of the persisted artifacts");

    Command::new("chronicle")
        .about("Inspect Chronicle event history and state")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("dump")
                .about("Decode the chain log and print events")
                .arg(root.clone())
                .arg(
                    Arg::new("last")
                        .long("last")
                        .value_name("N")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("20")
                        .help("Number of most recent events to show"),
                )
                .arg(
                    Arg::new("cmd")
                        .long("cmd")
                        .value_name("CMD")
                        .help("Only events for this command name"),
                )
                .arg(
                    Arg::new("csv")
                        .long("csv")
                        .action(ArgAction::SetTrue)
                        .help("Flat CSV export instead of a table"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Pretty JSON instead of a table"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_name("FILE")
                        .help("Write output to a file (a .csv suffix implies --csv)"),
                ),
        )
        .subcommand(
            Command::new("state")
                .about("Reconstruct and print a state stream snapshot")
                .arg(root.clone())
                .arg(
                    Arg::new("stream")
                        .long("stream")
                        .value_name("NAME")
                        .default_value("cli_state")
                        .help("Delta store stream to reconstruct"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Walk the whole chain and report integrity")
                .arg(root.clone()),
        )
        .subcommand(
            Command::new("rebuild")
                .about("Regenerate the mirror file and counters from the chain log")
                .arg(root),
        )
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let matches = build_cli().get_matches();
    let exit_code = match matches.subcommand() {
        Some(("dump", sub)) => run_dump(sub),
        Some(("state", sub)) => run_state(sub),
        Some(("verify", sub)) => run_verify(sub),
        Some(("rebuild", sub)) => run_rebuild(sub),
        _ => unreachable!("subcommand required"),
    };
    process::exit(exit_code);
}

fn config_for(matches: &ArgMatches) -> DispatchConfig {
    let root = matches
        .get_one::<String>("root")
        .map(|s| s.as_str())
        .unwrap_or(".chronicle");
    DispatchConfig::new(root)
}

fn run_dump(matches: &ArgMatches) -> i32 {
    let config = config_for(matches);
    let last = *matches.get_one::<usize>("last").unwrap_or(&20);
    let cmd_filter = matches.get_one::<String>("cmd");
    let out_path = matches.get_one::<String>("out");
    let want_csv = matches.get_flag("csv")
        || out_path.map(|p| p.ends_with(".csv")).unwrap_or(false);
    let want_json = matches.get_flag("json");

    let (events, broke) = match read_events(&config) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("failed to read chain log: {}", e);
            return 1;
        }
    };
    let events = select_events(events, cmd_filter.map(|s| s.as_str()), last);

    let rendered = if want_csv {
        render_csv(&events)
    } else if want_json {
        render_json(&events)
    } else {
        render_table(&events)
    };

    match out_path {
        Some(path) => {
            if let Err(e) = write_file(path, &rendered) {
                eprintln!("failed to write {}: {}", path, e);
                return 1;
            }
            eprintln!("wrote {} events to {}", events.len(), path);
        }
        None => println!("{}", rendered.trim_end()),
    }

    if broke {
        1
    } else {
        0
    }
}

/// Read and decode all events, verifying as we go
///
/// Returns the decoded events plus whether the chain broke; everything
/// before a break is still returned.
fn read_events(config: &DispatchConfig) -> Result<(Vec<Event>, bool), ChainError> {
    let chain = ChainLog::open_with(config.chain_path(), config.chain.clone());
    let mut events = Vec::new();
    let mut broke = false;

    for item in chain.iter()? {
        match item {
            Ok((sequence, payload)) => match serde_json::from_slice::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(e) => {
                    eprintln!("block {} payload is not an event: {}", sequence, e);
                }
            },
            Err(ChainError::Integrity { sequence, reason }) => {
                eprintln!("chain integrity broken at sequence {}: {}", sequence, reason);
                broke = true;
                break;
            }
            Err(ChainError::MalformedFrame { offset }) => {
                eprintln!("undecodable frame at offset {}", offset);
                broke = true;
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok((events, broke))
}

/// Apply the command filter, then keep the most recent `last` events
///
/// Input is in chain (chronological) order and stays chronological, so the
/// tail of the filtered list is the newest matching events.
fn select_events(mut events: Vec<Event>, cmd: Option<&str>, last: usize) -> Vec<Event> {
    if let Some(cmd) = cmd {
        events.retain(|e| e.cmd == cmd);
    }
    if events.len() > last {
        events.drain(..events.len() - last);
    }
    events
}

fn run_state(matches: &ArgMatches) -> i32 {
    let config = config_for(matches);
    let stream = matches
        .get_one::<String>("stream")
        .map(|s| s.as_str())
        .unwrap_or("cli_state");

    let store = DeltaStore::open_with(config.state_dir(), config.delta.clone());
    match store.load(stream) {
        Ok(snapshot) => {
            println!("{}", render_snapshot(&snapshot));
            0
        }
        Err(e) => {
            eprintln!("failed to reconstruct '{}': {}", stream, e);
            1
        }
    }
}

fn run_verify(matches: &ArgMatches) -> i32 {
    let config = config_for(matches);
    let chain = ChainLog::open_with(config.chain_path(), config.chain.clone());
    match chain.verify() {
        Ok(report) => {
            println!("{}", report.summary());
            if report.ok {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("verification failed to run: {}", e);
            1
        }
    }
}

fn run_rebuild(matches: &ArgMatches) -> i32 {
    let config = config_for(matches);
    match rebuild(&config) {
        Ok(report) => {
            println!("{}", report.summary());
            if report.chain_break_at.is_some() {
                1
            } else {
                0
            }
        }
        Err(e) => {
            eprintln!("rebuild failed: {}", e);
            1
        }
    }
}

fn write_file(path: &str, contents: &str) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(contents.as_bytes())
}
