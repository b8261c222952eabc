// Reads a JSON document (from a file or stdin), turns it into a record graph
// and writes it back out, reporting what was built along the way.
//
//     databarn [FILE] [--config OPTIONS_FILE]
//
// Logging follows RUST_LOG, e.g. RUST_LOG=databarn=debug.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use databarn::datatype::Value;
use databarn::marshal::{from_text_with, to_text};
use databarn::{ConversionOptions, Record, Result};

struct Arguments {
    input: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_arguments() -> Arguments {
    let mut arguments = Arguments {
        input: None,
        config: None,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => arguments.config = args.next().map(PathBuf::from),
            _ => arguments.input = Some(PathBuf::from(arg)),
        }
    }
    arguments
}

fn read_input(input: &Option<PathBuf>) -> std::io::Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

// counts the records and barns reachable from a record
fn census(record: &Record, records: &mut usize, barns: &mut usize) {
    *records += 1;
    for (_, value) in record.values() {
        match value {
            Value::Record(child) => census(&child, records, barns),
            Value::Barn(barn) => {
                *barns += 1;
                for member in barn.records() {
                    census(&member, records, barns);
                }
            }
            _ => (),
        }
    }
}

fn run(arguments: &Arguments, text: &str) -> Result<String> {
    let options = ConversionOptions::load(arguments.config.as_deref())?;
    let record = from_text_with(text, None, &options)?;
    let (mut records, mut barns) = (0, 0);
    census(&record, &mut records, &mut barns);
    info!(records, barns, fields = record.labels().len(), "document loaded");
    to_text(&record, &options)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let arguments = parse_arguments();
    let text = match read_input(&arguments.input) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "cannot read input");
            return ExitCode::FAILURE;
        }
    };
    match run(&arguments, &text) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "conversion failed");
            ExitCode::FAILURE
        }
    }
}
