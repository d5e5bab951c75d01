mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "serproto", version, about = "Framed serial command CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "SERPROTO_LOG",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "serproto",
            "send",
            "/dev/ttyACM0",
            "--baud",
            "115200",
            "--bind",
            "CMD_TEST1=4",
            "CMD_TEST1",
            "123",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.link.baud, 115200);
                assert_eq!(args.table.bindings.len(), 1);
                assert_eq!(args.command, "CMD_TEST1");
                assert_eq!(args.value, 123);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn send_accepts_negative_values() {
        let cli = Cli::try_parse_from([
            "serproto", "send", "COM3", "--bind", "CMD_ACK=1", "CMD_ACK", "-1",
        ])
        .expect("negative value should parse");
        assert!(matches!(cli.command, Command::Send(args) if args.value == -1));
    }

    #[test]
    fn rejects_malformed_binding() {
        let err = Cli::try_parse_from(["serproto", "encode", "--bind", "CMD_ACK", "CMD_ACK", "1"])
            .expect_err("binding without id should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_listen_subcommand() {
        let cli = Cli::try_parse_from([
            "serproto",
            "listen",
            "/dev/ttyUSB0",
            "--bind",
            "CMD_HEARTBEAT=0",
            "--count",
            "3",
            "--timeout",
            "10s",
        ])
        .expect("listen args should parse");
        assert!(matches!(cli.command, Command::Listen(args) if args.count == Some(3)));
    }

    #[test]
    fn link_defaults_match_connection_defaults() {
        let cli = Cli::try_parse_from(["serproto", "listen", "/dev/ttyUSB0"])
            .expect("listen args should parse");
        let Command::Listen(args) = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(args.link.baud, 9600);
        assert_eq!(
            args.link.connection_config().unwrap(),
            serproto_conn::ConnectionConfig::default()
        );
    }
}
