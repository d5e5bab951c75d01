use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use serproto_conn::{CommandBinding, Connection, ConnectionConfig, ConnectionState};

use crate::exit::{io_error, CliError, CliResult, FAILURE, TIMEOUT, TRANSPORT_ERROR, USAGE};
use crate::output::OutputFormat;

pub mod encode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a port, send one command and optionally print replies.
    Send(SendArgs),
    /// Open a port and print received frames.
    Listen(ListenArgs),
    /// Print the frame bytes for a command without opening a port.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the command table comes from.
#[derive(Args, Debug, Default)]
pub struct TableArgs {
    /// JSON file with command bindings, e.g. [{"name": "CMD_ACK", "id": 1}].
    #[arg(long, value_name = "FILE")]
    pub commands: Option<PathBuf>,
    /// Inline command binding (repeatable), e.g. --bind CMD_ACK=1.
    #[arg(long = "bind", value_name = "NAME=ID")]
    pub bindings: Vec<CommandBinding>,
}

impl TableArgs {
    /// File bindings first, then inline ones. Duplicates are rejected later
    /// when the table is built.
    pub fn load(&self) -> CliResult<Vec<CommandBinding>> {
        let mut bindings = match &self.commands {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|err| {
                    io_error(&format!("failed reading {}", path.display()), err)
                })?;
                serde_json::from_str::<Vec<CommandBinding>>(&text).map_err(|err| {
                    CliError::new(
                        USAGE,
                        format!("{} is not a valid command table: {err}", path.display()),
                    )
                })?
            }
            None => Vec::new(),
        };
        bindings.extend(self.bindings.iter().cloned());

        if bindings.is_empty() {
            return Err(CliError::new(
                USAGE,
                "no commands defined; pass --commands FILE or --bind NAME=ID",
            ));
        }
        Ok(bindings)
    }
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Serial device path (e.g. /dev/ttyACM0, COM3).
    pub port: String,
    /// Line speed.
    #[arg(long, short = 'b', default_value_t = 9600)]
    pub baud: u32,
    /// Wait after opening before the first send (e.g. 1s, 0ms).
    #[arg(long, default_value = "1s")]
    pub settle: String,
    /// Sleep between loop iterations (e.g. 50ms).
    #[arg(long, default_value = "50ms")]
    pub poll: String,
    /// How long to wait for the port to open.
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

impl LinkArgs {
    pub fn connection_config(&self) -> CliResult<ConnectionConfig> {
        Ok(ConnectionConfig {
            settle_delay: parse_delay(&self.settle)?,
            poll_interval: parse_duration(&self.poll)?,
            ..ConnectionConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    #[command(flatten)]
    pub table: TableArgs,
    /// Command name to send.
    pub command: String,
    /// Value to send; reduced modulo 256.
    #[arg(allow_hyphen_values = true)]
    pub value: i64,
    /// Keep the link open this long and print received frames (e.g. 2s).
    #[arg(long, value_name = "DURATION")]
    pub listen: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    #[command(flatten)]
    pub table: TableArgs,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit after this long (e.g. 30s). Default: until interrupted.
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub table: TableArgs,
    /// Command name to encode.
    pub command: String,
    /// Value to encode; reduced modulo 256.
    #[arg(allow_hyphen_values = true)]
    pub value: i64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Block until the loop has either connected or given up.
pub(crate) fn wait_connected(conn: &Connection, timeout: Duration) -> CliResult<()> {
    let settled = conn.wait_for_state(timeout, |state| state != ConnectionState::Connecting);
    match conn.state() {
        ConnectionState::Connected => Ok(()),
        _ if !settled => Err(CliError::new(
            TIMEOUT,
            format!("{} did not open within {timeout:?}", conn.port()),
        )),
        state => Err(link_failure(conn, state)),
    }
}

pub(crate) fn link_failure(conn: &Connection, state: ConnectionState) -> CliError {
    match conn.last_error() {
        Some(reason) => CliError::new(TRANSPORT_ERROR, format!("{}: {reason}", conn.port())),
        None => CliError::new(FAILURE, format!("{} is {state}", conn.port())),
    }
}

/// Parse `5s`, `150ms` or a bare number of seconds. Zero is rejected.
pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let duration = parse_delay(input)?;
    if duration.is_zero() {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }
    Ok(duration)
}

/// Like [`parse_duration`] but allows zero.
pub(crate) fn parse_delay(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
