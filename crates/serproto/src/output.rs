use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serproto_conn::CommandKey;
use serproto_frame::Frame;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
    Encoded,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Sent => "tx",
            Direction::Received => "rx",
            Direction::Encoded => "--",
        }
    }
}

/// A frame together with what it meant on this link.
pub struct FrameRecord<'a> {
    pub direction: Direction,
    pub port: Option<&'a str>,
    pub key: &'a CommandKey,
    pub frame: Frame,
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<&'a str>,
    command: Option<&'a str>,
    command_id: u8,
    value: u8,
    checksum: u8,
    bytes: String,
    timestamp: String,
}

pub fn print_frame(record: &FrameRecord<'_>, format: OutputFormat) {
    let frame = record.frame;
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                direction: record.direction,
                port: record.port,
                command: record.key.name(),
                command_id: frame.command_id,
                value: frame.value,
                checksum: frame.checksum(),
                bytes: hex_bytes(&frame.to_bytes()),
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
                .set_header(vec!["DIR", "COMMAND", "ID", "VALUE", "BYTES"])
                .add_row(vec![
                    record.direction.label().to_string(),
                    record.key.to_string(),
                    frame.command_id.to_string(),
                    frame.value.to_string(),
                    hex_bytes(&frame.to_bytes()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} {} id={} value={} bytes=[{}]",
                record.direction.label(),
                record.key,
                frame.command_id,
                frame.value,
                hex_bytes(&frame.to_bytes())
            );
        }
        OutputFormat::Raw => {
            print_raw(&frame.to_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn hex_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_lowercase_and_spaced() {
        assert_eq!(hex_bytes(&[0xFF, 0xFE, 4, 123, 127]), "ff fe 04 7b 7f");
        assert_eq!(hex_bytes(&[]), "");
    }
}
