//! Drive a connection against an in-memory device.
//!
//! The "device" thread answers heartbeats with heartbeats and everything
//! else with an ACK carrying the received value.
//!
//! ```text
//! cargo run -p serproto --example loopback
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serproto::conn::{handler, Connection, ConnectionConfig, ConnectionState};
use serproto::frame::{Frame, FrameReader, FrameWriter};
use serproto::transport::{MemoryLink, MemoryOpener};

const HEARTBEAT: u8 = 0;
const ACK: u8 = 1;

fn run_device(mut link: MemoryLink) {
    let mut reader = FrameReader::new();
    let mut writer = FrameWriter::new();
    loop {
        let frames = match reader.poll(&mut link) {
            Ok(frames) => frames,
            Err(_) => return,
        };
        for frame in frames {
            let reply = match frame.command_id {
                HEARTBEAT => Frame::new(HEARTBEAT, frame.value),
                _ => Frame::new(ACK, frame.value),
            };
            if writer.write_frame(&mut link, &reply).is_err() {
                return;
            }
        }
        thread::sleep(Duration::from_millis(5));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (opener, device) = MemoryOpener::with_pair();
    let device = thread::spawn(move || run_device(device));

    let conn = Connection::builder("loop0", 9600)
        .with_commands([("CMD_HEARTBEAT", 0), ("CMD_ACK", 1), ("CMD_TEST1", 4)])
        .with_config(ConnectionConfig {
            settle_delay: Duration::from_millis(100),
            ..ConnectionConfig::default()
        })
        .with_opener(Arc::new(opener))
        .build()?;

    conn.register_callback(
        "CMD_HEARTBEAT",
        handler(|conn, cmd, value| {
            println!("cb: heartbeat 1 {} {} {cmd} {value}", conn.port(), conn.baud());
        }),
    )?;
    conn.register_callback(
        "CMD_HEARTBEAT",
        handler(|conn, cmd, value| {
            println!("cb: heartbeat 3 {} {} {cmd} {value}", conn.port(), conn.baud());
        }),
    )?;

    {
        let session = conn.scoped()?;
        session.wait_for_state(Duration::from_secs(1), |s| s == ConnectionState::Connected);

        session.send_command("CMD_TEST1", 123)?;
        session.send_command("CMD_HEARTBEAT", 2)?;
        thread::sleep(Duration::from_millis(500));

        session.clear_callbacks("CMD_HEARTBEAT")?;
        session.register_callback(
            "CMD_ACK",
            handler(|conn, cmd, value| {
                println!("cb: ack {} {} {cmd} {value}", conn.port(), conn.baud());
            }),
        )?;

        session.send_command("CMD_TEST1", 123)?;
        session.send_command("CMD_HEARTBEAT", 2)?;
        thread::sleep(Duration::from_millis(500));

        let stats = session.stats();
        println!(
            "sent={} decoded={} checksum_errors={}",
            stats.frames_sent, stats.decoder.frames_decoded, stats.decoder.checksum_errors
        );
    }

    // Closing the connection closes the device's end too.
    let _ = device.join();
    Ok(())
}
