//! Access Control Enforcer CLI
//!
//! Evaluates access decisions against a simulated secure element described
//! by a JSON fixture.

mod fixture;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fixture::{parse_hex, Fixture};
use se_access_control::providers::NoopCallback;
use se_access_control::{AceError, AceErrorCode, SecurityProfile};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ace-cli")]
#[command(about = "Evaluate secure element access control decisions")]
struct Args {
    /// Secure element fixture (.json)
    #[arg(short, long, value_name = "FILE")]
    fixture: PathBuf,

    /// Security profile (.json); defaults to both rule sources enabled
    #[arg(short, long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Terminal name; names starting with "SIM" are UICC-class
    #[arg(short, long, default_value = "SIM1")]
    terminal: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the channel access decision for a package
    Resolve {
        #[arg(long)]
        aid: String,
        #[arg(long)]
        package: String,
    },
    /// Resolve a decision, then check one command against it
    Check {
        #[arg(long)]
        aid: String,
        #[arg(long)]
        package: String,
        #[arg(long)]
        apdu: String,
    },
    /// NFC event permission for each package
    Nfc {
        #[arg(long)]
        aid: String,
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Print enforcer posture and rule cache
    Dump,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            let code = err
                .downcast_ref::<AceError>()
                .map(AceErrorCode::from)
                .unwrap_or(AceErrorCode::Internal);
            ExitCode::from(code as u8)
        }
    }
}

fn run(args: Args) -> Result<()> {
    let fixture = Fixture::load(&args.fixture)?;
    let profile = match &args.profile {
        Some(path) => SecurityProfile::load(path).context("Failed to load security profile")?,
        None => SecurityProfile::default(),
    };

    let enforcer = fixture.build_enforcer(&args.terminal, profile)?;
    let status = enforcer
        .initialize(true, &NoopCallback)
        .context("Failed to initialize access control enforcer")?;
    if !status {
        log::warn!("Rule source failed on {}: all access is denied", args.terminal);
    }

    let mut out = io::stdout().lock();
    match args.command {
        Command::Resolve { aid, package } => {
            let decision = enforcer.resolve_channel_access(&parse_hex(&aid)?, &package)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&decision)?)?;
        }
        Command::Check { aid, package, apdu } => {
            let decision = enforcer.resolve_channel_access(&parse_hex(&aid)?, &package)?;
            enforcer.check_command(Some(&decision), &parse_hex(&apdu)?)?;
            writeln!(out, "command allowed")?;
        }
        Command::Nfc { aid, packages } => {
            let flags = enforcer.is_event_allowed(&parse_hex(&aid)?, packages.as_slice());
            for (package, allowed) in packages.iter().zip(flags) {
                writeln!(out, "{}\t{}", package, allowed)?;
            }
        }
        Command::Dump => enforcer.dump(&mut out)?,
    }

    Ok(())
}
