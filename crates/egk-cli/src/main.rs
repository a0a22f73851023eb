use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use egk_card::SessionOptions;
use tracing_subscriber::EnvFilter;

mod commands;
mod formatters;
mod worker;

use commands::ReadOptions;
use formatters::FormatMode;

#[derive(Parser)]
#[command(name = "egk")]
#[command(about = "eGK Reader - Read patient and insurance data from German health insurance cards")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Reader to use (default: first available reader)
    #[arg(short, long, global = true)]
    reader: Option<String>,

    /// Card profile file (TOML), built-in profiles otherwise
    #[arg(long, env = "EGK_PROFILES", global = true)]
    profiles: Option<PathBuf>,

    /// Output format mode
    #[arg(short, long, value_enum, default_value_t = FormatMode::Human, global = true)]
    format: FormatMode,

    /// Leave the card in the reader when done
    #[arg(long, global = true)]
    no_eject: bool,

    /// Skip RESET CT and REQUEST ICC for readers without CT-BCS support
    #[arg(long, global = true)]
    no_ct_bcs: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Read the card once and print its data (default)
    Read,
    /// List card readers and whether a card is inserted
    Readers,
    /// Read the card and print the decompressed container XML
    Dump,
    /// Wait for cards and read every inserted card
    Watch {
        /// Exit after the first card
        #[arg(long)]
        once: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Set RUST_LOG=debug for APDU traces
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let options = ReadOptions {
        reader: args.reader,
        profiles: args.profiles,
        format: args.format,
        session: SessionOptions {
            eject_on_finish: !args.no_eject,
            request_icc: !args.no_ct_bcs,
        },
    };

    match args.command.unwrap_or(Command::Read) {
        Command::Read => commands::read::cmd_read(&options),
        Command::Readers => commands::readers::cmd_readers(),
        Command::Dump => commands::dump::cmd_dump(&options),
        Command::Watch { once } => commands::watch::cmd_watch(&options, once),
    }
}
