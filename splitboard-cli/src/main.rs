mod keymap_file;
mod layout;
mod replay;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;

use keymap_file::with_keymap;

#[derive(Parser)]
#[command(name = "splitboard-cli")]
#[command(about = "Split keyboard keymap tools")]
struct Cli {
    /// More output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a keymap file (the built-in keymap without one)
    Check {
        /// Path to a JSON keymap
        keymap: Option<PathBuf>,
    },
    /// Write an HTML/SVG drawing of every layer
    Layout {
        /// Path to a JSON keymap
        keymap: Option<PathBuf>,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Feed a scan trace through the keyboard and print what the host sees
    Replay {
        /// Trace file: one line of closed `col,row` switches per cycle
        trace: PathBuf,
        /// Path to a JSON keymap
        #[arg(short, long)]
        keymap: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Command::Check { keymap } => {
            let summary = with_keymap(keymap.as_deref(), |keymap| {
                Ok(format!(
                    "{}x{} matrix, split at column {}, {} layer(s)",
                    keymap.columns(),
                    keymap.rows(),
                    keymap.split(),
                    keymap.layers().count()
                ))
            })?;
            println!("ok: {summary}");
        }
        Command::Layout { keymap, output } => {
            let html = with_keymap(keymap.as_deref(), |keymap| Ok(layout::generate_html(&keymap)))?;
            match output {
                Some(path) => {
                    fs::write(&path, html).with_context(|| format!("writing {}", path.display()))?;
                    println!("Layout written to {}", path.display());
                }
                None => print!("{html}"),
            }
        }
        Command::Replay { trace, keymap } => {
            let text = fs::read_to_string(&trace)
                .with_context(|| format!("reading {}", trace.display()))?;
            let batches = with_keymap(keymap.as_deref(), |keymap| {
                let frames = replay::parse_trace(&text, &keymap)
                    .with_context(|| format!("parsing {}", trace.display()))?;
                replay::replay(keymap, &frames)
            })?;
            for (cycle, batch) in batches {
                println!("cycle {cycle}: {batch}");
            }
        }
    }

    Ok(())
}
