//! Offline check of the configured extractor.
//!
//! Runs one message through extraction and prints the rows the gateway would
//! append, without touching LINE or the spreadsheet.

use std::env;
use std::io::Read;
use std::path::PathBuf;
use std::process::exit;

use intake_module::report::assemble_row;
use intake_module::service::{load_directory, ExtractorConfig, DEFAULT_UTC_OFFSET_HOURS};
use intake_module::{ReportDate, UNKNOWN_ACTOR};

fn print_usage() {
    eprintln!(
        r##"Usage: intake-preview [--name="display name"] [--json] [message]

Reads the message from the last argument, or from stdin when none is given,
and prints one tab-separated row per extracted report.

Options:
  --name="..."   Chat display name of the sender, resolved through the directory
  --json         Print rows as a JSON array instead of tab-separated lines

Environment Variables:
  EXTRACTOR              - pattern | openai | gemini
  OPENAI_API_KEY         - OpenAI key (selects openai when EXTRACTOR is unset)
  GEMINI_API_KEY         - Gemini key (selects gemini when no OpenAI key)
  LLM_MODEL              - (optional) model override
  LLM_RESPONSE_FORMAT    - (optional) tab | json
  INTAKE_DIRECTORY_PATH  - (optional) directory TOML with display names
  REPORT_UTC_OFFSET_HOURS - (optional) offset used for the date column (default: 8)
"##
    );
}

fn parse_arg(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    args.iter()
        .find_map(|arg| arg.strip_prefix(&prefix).map(str::to_string))
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_usage();
        exit(0);
    }
    let as_json = args.iter().any(|arg| arg == "--json");
    let raw_name = parse_arg(&args, "--name");
    let message = args.iter().rev().find(|arg| !arg.starts_with("--")).cloned();

    if let Err(err) = run(raw_name, message, as_json) {
        eprintln!("Error: {}", err);
        exit(1);
    }
}

fn run(
    raw_name: Option<String>,
    message: Option<String>,
    as_json: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let text = match message {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    if text.trim().is_empty() {
        print_usage();
        return Err("no message given".into());
    }

    let directory_path = env::var("INTAKE_DIRECTORY_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);
    let directory = load_directory(directory_path.as_deref())?;
    let actor = match raw_name {
        Some(name) => directory.resolver().resolve(&name),
        None => UNKNOWN_ACTOR.to_string(),
    };

    let extractor = ExtractorConfig::from_env()?.build(directory.classifier())?;
    let reports = extractor.extract(&text, &actor)?;
    if reports.is_empty() {
        eprintln!("{} extractor found nothing to record", extractor.name());
        return Ok(());
    }

    let offset_hours = env::var("REPORT_UTC_OFFSET_HOURS")
        .ok()
        .and_then(|value| value.trim().parse::<i32>().ok())
        .unwrap_or(DEFAULT_UTC_OFFSET_HOURS);
    let date = ReportDate::utc_offset_hours(offset_hours)
        .ok_or_else(|| format!("invalid REPORT_UTC_OFFSET_HOURS: {}", offset_hours))?
        .today();
    let rows: Vec<Vec<String>> = reports
        .iter()
        .map(|report| assemble_row(report, &date))
        .collect();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in rows {
            println!("{}", row.join("\t"));
        }
    }
    Ok(())
}
