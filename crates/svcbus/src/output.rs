use std::io::IsTerminal;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// What a printed value is: a call result or an event push.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Result,
    Event,
}

impl ValueKind {
    fn as_str(self) -> &'static str {
        match self {
            ValueKind::Result => "result",
            ValueKind::Event => "event",
        }
    }
}

#[derive(Serialize)]
struct ValueOutput<'a> {
    kind: ValueKind,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seq: Option<usize>,
    value: &'a Value,
    timestamp: String,
}

pub fn print_value(kind: ValueKind, name: &str, seq: Option<usize>, value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ValueOutput {
                kind,
                name,
                seq,
                value,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "NAME", "SEQ", "VALUE"])
                .add_row(vec![
                    kind.as_str().to_string(),
                    name.to_string(),
                    seq.map(|n| n.to_string()).unwrap_or_default(),
                    value.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match seq {
            Some(seq) => println!("{} {name}[{seq}] = {value}", kind.as_str()),
            None => println!("{} {name} = {value}", kind.as_str()),
        },
    }
}

#[derive(Serialize)]
struct ServingOutput<'a> {
    socket: String,
    methods: &'a [String],
    events: &'a [String],
}

pub fn print_serving(path: &Path, methods: &[String], events: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ServingOutput {
                socket: path.display().to_string(),
                methods,
                events,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "NAME"]);
            for method in methods {
                table.add_row(vec!["method", method.as_str()]);
            }
            for event in events {
                table.add_row(vec!["event", event.as_str()]);
            }
            println!("serving on {}", path.display());
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "serving on {} methods=[{}] events=[{}]",
                path.display(),
                methods.join(", "),
                events.join(", ")
            );
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
