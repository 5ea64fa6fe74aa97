pub mod cli;
pub mod decode;
pub mod error;
pub mod io_utils;
pub mod record;
pub mod schema;
pub mod split;
pub mod unmarshal;
pub mod validate;
pub mod value;
pub mod well_known;

use std::{env, io::Write, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::cli::{Cli, Commands};

pub use crate::{
    error::Error,
    record::{Record, RecordDecoder},
    schema::{FieldSpec, FieldType, Label, Schema},
    unmarshal::{MessageStream, Unmarshaler},
    value::{DynamicMessage, DynamicValue, Value, WellKnownValue},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csvpb", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Decode(args) => handle_decode(&args),
        Commands::Schema(args) => handle_schema(&args),
    }
}

fn handle_decode(args: &cli::DecodeArgs) -> Result<()> {
    let delimiter = args.delimiter.unwrap_or(io_utils::DEFAULT_DELIMITER);
    info!(
        "Decoding '{}' as {} using delimiter '{}'",
        args.input.display(),
        args.message,
        printable_delimiter(delimiter)
    );
    let schema = Schema::load(&args.schema)
        .with_context(|| format!("Loading schema from {:?}", args.schema))?;

    let mut unmarshaler = Unmarshaler::new(&schema)
        .allow_unknown_fields(args.allow_unknown_fields)
        .with_delimiter(delimiter);
    let header = args
        .header
        .iter()
        .map(|name| name.trim().to_string())
        .collect::<Vec<_>>();
    if !header.is_empty() {
        debug!("Using header from command line: {header:?}");
        unmarshaler = unmarshaler.with_header(header);
    }

    let input = io_utils::open_input(&args.input)?;
    let mut output = io_utils::open_output(args.output.as_deref())?;
    let stream = unmarshaler
        .stream(input, &args.message)
        .with_context(|| format!("Reading header from {:?}", args.input))?;

    let mut written = 0usize;
    for (index, message) in stream.enumerate() {
        let message = message.with_context(|| format!("Decoding record {}", index + 1))?;
        serde_json::to_writer(&mut output, &message.to_json())
            .context("Writing JSON output")?;
        writeln!(output).context("Writing JSON output")?;
        written += 1;
    }
    output.flush().context("Flushing output")?;
    info!("Decoded {written} record(s) into {}", args.message);
    Ok(())
}

fn handle_schema(args: &cli::SchemaArgs) -> Result<()> {
    let schema = Schema::load(&args.schema)
        .with_context(|| format!("Loading schema from {:?}", args.schema))?;
    info!(
        "Schema {:?} is valid: {} message(s), {} enum(s)",
        args.schema,
        schema.messages.len(),
        schema.enums.len()
    );
    if !args.quiet {
        let mut stdout = std::io::stdout();
        stdout
            .write_all(schema.to_yaml_string()?.as_bytes())
            .context("Writing schema")?;
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
