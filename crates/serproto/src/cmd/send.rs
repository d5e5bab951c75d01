use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Instant;

use serproto_conn::{Connection, ConnectionState};
use serproto_frame::{frame_for_command, Frame};
use tracing::debug;

use crate::cmd::listen::{print_received, subscribe_all};
use crate::cmd::{link_failure, parse_duration, wait_connected, SendArgs};
use crate::exit::{conn_error, frame_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_frame, Direction, FrameRecord, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.connection_config()?;
    let connect_timeout = parse_duration(&args.link.connect_timeout)?;
    let listen_for = args.listen.as_deref().map(parse_duration).transpose()?;

    let conn = Connection::builder(&args.link.port, args.link.baud)
        .with_commands(args.table.load()?)
        .with_config(config)
        .build()
        .map_err(|err| conn_error("invalid command table", err))?;

    // Reject unknown commands before touching the port.
    let frame = frame_for_command(conn.commands(), &args.command, args.value)
        .map_err(|err| frame_error("send failed", err))?;

    let replies = match listen_for {
        Some(_) => Some(subscribe_all(&conn)?),
        None => None,
    };

    let session = conn.scoped().map_err(|err| conn_error("open failed", err))?;
    wait_connected(&session, connect_timeout)?;
    session
        .send_command(&args.command, args.value)
        .map_err(|err| conn_error("send failed", err))?;

    // The first write happens after the settle delay.
    let write_timeout = session.config().settle_delay + connect_timeout;
    let written = session.wait_until(write_timeout, || {
        session.state() == ConnectionState::Stopped || session.stats().frames_sent >= 1
    });
    let state = session.state();
    if state == ConnectionState::Stopped {
        return Err(link_failure(&session, state));
    }
    if !written {
        return Err(CliError::new(
            TIMEOUT,
            format!("command not written within {write_timeout:?}"),
        ));
    }

    print_frame(
        &FrameRecord {
            direction: Direction::Sent,
            port: Some(session.port()),
            key: &session.commands().key_for(frame.command_id),
            frame,
        },
        format,
    );

    if let (Some(replies), Some(window)) = (replies, listen_for) {
        debug!(?window, "printing replies");
        print_until(&session, &replies, Instant::now() + window, format);
    }

    Ok(SUCCESS)
}

fn print_until(conn: &Connection, replies: &Receiver<Frame>, deadline: Instant, format: OutputFormat) {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        match replies.recv_timeout(remaining) {
            Ok(frame) => print_received(conn, frame, format),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return,
        }
    }
}
