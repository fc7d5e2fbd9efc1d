//! CAN Signal Database CLI Application
//!
//! Command-line front end for the can-signal-db library. It loads one bus of
//! a JSON network description onto a virtual channel and can:
//! - List the messages and signals of the bus
//! - Replay frames through the database and print watched updates
//! - Assign signal values and show the frames that would be transmitted

use anyhow::{Context, Result};
use can_signal_db::{Database, NetworkDescription, Notification, VirtualChannel};
use clap::Parser;
use std::path::PathBuf;

mod config;
mod input;

use config::AppConfig;

/// CAN Signal DB - Decode and encode CAN signals from a JSON description
#[derive(Parser, Debug)]
#[command(name = "can-signal-cli")]
#[command(about = "Decode and encode CAN signals described by a JSON network file", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the JSON network description
    #[arg(short, long, value_name = "FILE")]
    description: Option<PathBuf>,

    /// Bus of the description to load
    #[arg(short, long, value_name = "NAME")]
    bus: Option<String>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// List messages and signals of the bus
    #[arg(long)]
    list: bool,

    /// Frame to feed through the database, ID#HEX (can be repeated)
    #[arg(long, value_name = "FRAME")]
    decode: Vec<String>,

    /// Signal assignment Message.Signal=VALUE (can be repeated)
    #[arg(long, value_name = "ASSIGNMENT")]
    set: Vec<String>,

    /// Message to transmit (can be repeated)
    #[arg(long, value_name = "MESSAGE")]
    send: Vec<String>,

    /// Print updates of a Message or Message.Signal (can be repeated)
    #[arg(short, long, value_name = "PATH")]
    watch: Vec<String>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Signal CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using database library v{}", can_signal_db::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    merge_args(&mut config, args);

    let (Some(description_path), Some(bus)) = (config.description.clone(), config.bus.clone()) else {
        println!("CAN Signal CLI - No description specified");
        println!("\nQuick Start:");
        println!("  can-signal-cli --description network.json --bus Body --list");
        println!("  can-signal-cli -d network.json -b Body --watch Engine.RPM --decode 100#A00F");
        println!("  can-signal-cli -d network.json -b Body --set Engine.RPM=1000 --send Engine");
        println!("\nUse --help for more options");
        return Ok(());
    };

    let description = NetworkDescription::from_file(&description_path)
        .with_context(|| format!("Failed to load description {:?}", description_path))?;
    let mut db = Database::setup(
        &description,
        &bus,
        config.channel.build(),
        config.database.clone(),
    )
    .with_context(|| format!("Failed to set up bus '{}'", bus))?;

    if config.watch.is_empty() && config.send.is_empty() && config.replay.is_empty() && config.set.is_empty() {
        print_messages(&db);
        return Ok(());
    }

    run(&mut db, &config)
}

/// Command line flags extend (lists) or override (scalars) the config file
fn merge_args(config: &mut AppConfig, args: Args) {
    if args.description.is_some() {
        config.description = args.description;
    }
    if args.bus.is_some() {
        config.bus = args.bus;
    }
    config.replay.extend(args.decode);
    config.set.extend(args.set);
    config.send.extend(args.send);
    config.watch.extend(args.watch);

    // An explicit --list wins over any actions from the config file
    if args.list {
        config.replay.clear();
        config.set.clear();
        config.send.clear();
        config.watch.clear();
    }
}

fn run(db: &mut Database<VirtualChannel>, config: &AppConfig) -> Result<()> {
    for path in &config.watch {
        let label = path.clone();
        db.register_listener(path, move |update| match update {
            Notification::Signal(signal) => {
                println!("  {} = {} (raw {})", label, signal.value(), signal.raw_value())
            }
            Notification::Message(message) => {
                let values: Vec<String> = message
                    .signals()
                    .map(|s| format!("{}={}", s.name(), s.value()))
                    .collect();
                println!("  {} [{}]", label, values.join(", "))
            }
        })
        .with_context(|| format!("Cannot watch '{}'", path))?;
        log::debug!("Watching {}", path);
    }

    for text in &config.replay {
        let frame = input::parse_frame(text)?;
        println!("RX {}", frame);
        if !db.transport_mut().inject(frame) {
            println!("  (rejected by receive filters)");
        }
        db.poll()?;
    }

    for text in &config.set {
        let assignment = input::parse_assignment(text)?;
        db.update_signal_value(&assignment.message, &assignment.signal, assignment.value)?;
    }

    for name in &config.send {
        db.send(name).with_context(|| format!("Failed to send '{}'", name))?;
    }
    for frame in db.transport_mut().take_sent() {
        println!("TX {}", frame);
    }

    // Looped-back frames
    let looped = db.poll()?;
    if looped > 0 {
        log::debug!("Dispatched {} looped-back frames", looped);
    }

    Ok(())
}

fn print_messages(db: &Database<VirtualChannel>) {
    let stats = db.stats();
    println!("Messages: {}", stats.num_messages);
    println!("Signals:  {}", stats.num_signals);

    for message in db.messages() {
        let timing = match message.interval_ms() {
            Some(interval) => format!("every {} ms", interval),
            None => "triggered".to_string(),
        };
        println!(
            "\n{} ({}, {} bytes, {})",
            message.name(),
            message.key(),
            message.length(),
            timing
        );
        for signal in message.signals() {
            let def = signal.definition();
            println!(
                "  {:<24} bit {:>3} len {:>2} {:?} {:?} = {}",
                def.name,
                def.bit_offset,
                def.bit_length,
                def.byte_order,
                def.value_type,
                signal.value()
            );
        }
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_args() {
        let mut config = AppConfig {
            bus: Some("Body".to_string()),
            watch: vec!["Door".to_string()],
            ..AppConfig::default()
        };
        let args = Args::parse_from([
            "can-signal-cli",
            "--description",
            "net.json",
            "--watch",
            "Engine.RPM",
            "--decode",
            "100#A00F",
        ]);

        merge_args(&mut config, args);
        assert_eq!(config.description, Some(PathBuf::from("net.json")));
        assert_eq!(config.bus.as_deref(), Some("Body"));
        assert_eq!(config.watch, vec!["Door", "Engine.RPM"]);
        assert_eq!(config.replay, vec!["100#A00F"]);
    }

    #[test]
    fn test_list_clears_actions() {
        let mut config = AppConfig {
            send: vec!["Engine".to_string()],
            ..AppConfig::default()
        };
        merge_args(&mut config, Args::parse_from(["can-signal-cli", "--list"]));
        assert!(config.send.is_empty());
    }

    #[test]
    fn test_run_replays_and_sends() {
        let description = NetworkDescription::from_json_str(
            r#"{ "buses": { "Body": { "messages": [
                { "name": "Engine", "id": 256, "length": 2, "signals": [
                    { "name": "RPM", "bitOffset": 0, "bitLength": 16, "factor": 0.25 }
                ] }
            ] } } }"#,
        )
        .unwrap();
        let config = AppConfig {
            replay: vec!["100#A00F".to_string()],
            set: vec!["Engine.RPM=250".to_string()],
            send: vec!["Engine".to_string()],
            watch: vec!["Engine.RPM".to_string()],
            ..AppConfig::default()
        };
        let mut db = Database::setup(&description, "Body", config.channel.build(), config.database.clone()).unwrap();

        run(&mut db, &config).unwrap();
        assert_eq!(db.signal("Engine", "RPM").unwrap().value(), 250.0);
        assert!(db.message("Engine").unwrap().last_sent().is_some());
    }
}
