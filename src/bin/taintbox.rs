//! Taintbox CLI - inspect and normalize documents carrying tainted and
//! encrypted values
//!
//! No command here reads secrets; encrypted values stay sealed.

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use taintbox::{
    DecodeOptions, Decoder, EncodeOptions, Encoder, ErrorCategory, ErrorKind, Result,
    SentinelCheck, TaintboxError,
};

#[derive(Parser)]
#[command(name = "taintbox")]
#[command(version)]
#[command(about = "Inspect and normalize JSON with tainted and encrypted values.", long_about = None)]
struct Cli {
    /// Treat a sentinel key as set even when its payload is empty or false
    #[arg(long, global = true)]
    presence_sentinels: bool,

    /// Also reconstruct envelopes found inside arrays
    #[arg(long, global = true)]
    recurse_arrays: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the extended values in a document, one JSON pointer per line
    #[command(alias = "i")]
    Inspect {
        /// Path to the JSON document
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },

    /// Decode a document and encode it again
    #[command(alias = "n")]
    Normalize {
        /// Path to the JSON document
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the normalized document to
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Indent the output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let check = if cli.presence_sentinels {
        SentinelCheck::Presence
    } else {
        SentinelCheck::Truthy
    };
    let decoder = Decoder::with_options(
        DecodeOptions::default()
            .sentinel_check(check)
            .recurse_into_arrays(cli.recurse_arrays),
    );

    let result = match cli.command {
        Commands::Inspect { input } => inspect(&decoder, &input),
        Commands::Normalize {
            input,
            output,
            pretty,
        } => normalize(&decoder, &input, &output, pretty),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        process::exit(1);
    }
}

fn inspect(decoder: &Decoder, input: &Path) -> Result<()> {
    let value = decoder
        .decode(&read_input(input)?)
        .map_err(|e| e.with_context(format!("failed to decode {}", input.display())))?;

    let mut stdout = io::stdout().lock();
    for (pointer, kind) in value.extended_paths() {
        writeln!(stdout, "{}\t{}", pointer, kind).map_err(io_error("failed to write output"))?;
    }
    Ok(())
}

fn normalize(decoder: &Decoder, input: &Path, output: &Path, pretty: bool) -> Result<()> {
    let value = decoder
        .decode(&read_input(input)?)
        .map_err(|e| e.with_context(format!("failed to decode {}", input.display())))?;
    let mut text = Encoder::new(EncodeOptions::default().pretty(pretty))
        .encode(&value)
        .map_err(|e| e.with_context("failed to encode"))?;
    text.push('\n');
    write_atomically(output, text.as_bytes())
}

fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        let category = if e.kind() == io::ErrorKind::NotFound {
            ErrorCategory::User
        } else {
            ErrorCategory::Internal
        };
        TaintboxError::with_kind_and_source(
            category,
            ErrorKind::Io,
            format!("failed to read from {}", path.display()),
            e,
        )
    })
}

fn io_error(msg: &'static str) -> impl Fn(io::Error) -> TaintboxError {
    move |e| TaintboxError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Io, msg, e)
}

/// Writes through a synced tempfile in the target directory, then renames,
/// so readers see either the old document or the complete new one.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp_file =
        tempfile::NamedTempFile::new_in(dir).map_err(io_error("failed to create tempfile"))?;
    temp_file
        .write_all(contents)
        .map_err(io_error("failed to write to tempfile"))?;
    temp_file
        .flush()
        .map_err(io_error("failed to flush tempfile"))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(io_error("failed to sync file prior to rename"))?;
    temp_file.persist(path).map_err(|e| {
        TaintboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}
