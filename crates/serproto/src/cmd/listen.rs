use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serproto_conn::{handler, Connection, ConnectionState};
use serproto_frame::Frame;
use tracing::info;

use crate::cmd::{link_failure, parse_duration, wait_connected, ListenArgs};
use crate::exit::{conn_error, CliError, CliResult, SUCCESS};
use crate::output::{print_frame, Direction, FrameRecord, OutputFormat};

const TICK: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.connection_config()?;
    let connect_timeout = parse_duration(&args.link.connect_timeout)?;
    let deadline = match args.timeout.as_deref() {
        Some(input) => Some(Instant::now() + parse_duration(input)?),
        None => None,
    };

    let conn = Connection::builder(&args.link.port, args.link.baud)
        .with_commands(args.table.load()?)
        .with_config(config)
        .build()
        .map_err(|err| conn_error("invalid command table", err))?;
    let frames = subscribe_all(&conn)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let session = conn.scoped().map_err(|err| conn_error("open failed", err))?;
    wait_connected(&session, connect_timeout)?;
    info!(port = session.port(), baud = session.baud(), "listening");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }

        match frames.recv_timeout(TICK) {
            Ok(frame) => {
                print_received(&session, frame, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    return Ok(SUCCESS);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let state = session.state();
                if state == ConnectionState::Stopped {
                    return Err(link_failure(&session, state));
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(SUCCESS)
}

/// Forward every named frame the connection dispatches into a channel.
///
/// Frames whose id has no binding never reach callbacks, so they are only
/// visible in the loop's debug log.
pub(crate) fn subscribe_all(conn: &Connection) -> CliResult<Receiver<Frame>> {
    let (tx, rx) = mpsc::channel();
    let forward = handler(move |conn, key, value| {
        let id = key.name().and_then(|name| conn.commands().id_for(name).ok());
        if let Some(id) = id {
            let _ = tx.send(Frame::new(id, value));
        }
    });

    let names: Vec<String> = conn.commands().names().map(str::to_string).collect();
    for name in names {
        conn.register_callback(&name, Arc::clone(&forward))
            .map_err(|err| conn_error("subscribe failed", err))?;
    }
    Ok(rx)
}

pub(crate) fn print_received(conn: &Connection, frame: Frame, format: OutputFormat) {
    print_frame(
        &FrameRecord {
            direction: Direction::Received,
            port: Some(conn.port()),
            key: &conn.commands().key_for(frame.command_id),
            frame,
        },
        format,
    );
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
