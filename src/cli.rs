use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Decode CSV records into schema-described messages", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode every record of a CSV file into messages, one JSON object per line
    Decode(DecodeArgs),
    /// Validate a schema file and print it in normalized form
    Schema(SchemaArgs),
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// YAML schema describing the target messages
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Message type every record is decoded into
    #[arg(short, long)]
    pub message: String,
    /// Input CSV file (`-` for stdin)
    #[arg(short = 'i', long = "input", default_value = "-")]
    pub input: PathBuf,
    /// Output file for JSON lines (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Drop columns that match no field instead of failing
    #[arg(long = "allow-unknown-fields")]
    pub allow_unknown_fields: bool,
    /// Comma-separated field names; when given, the first input line is data
    #[arg(long = "header", value_delimiter = ',')]
    pub header: Vec<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// YAML schema to check
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Only report whether the schema is valid
    #[arg(short, long)]
    pub quiet: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() || first == '"' || first == '\n' {
                return Err("Delimiter must be an ASCII character other than quote or newline".to_string());
            }
            Ok(first as u8)
        }
    }
}
