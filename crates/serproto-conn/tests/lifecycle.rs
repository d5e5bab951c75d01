use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serproto_conn::{
    handler, CommandKey, ConnError, Connection, ConnectionConfig, ConnectionState,
};
use serproto_transport::{Link, LinkOpener, MemoryLink, MemoryOpener, TransportError};

const TIMEOUT: Duration = Duration::from_secs(3);

fn fast_config() -> ConnectionConfig {
    ConnectionConfig {
        settle_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(1),
        ..ConnectionConfig::default()
    }
}

fn build(opener: Arc<dyn LinkOpener>, config: ConnectionConfig) -> Connection {
    Connection::builder("loop0", 9600)
        .with_commands([("CMD_HEARTBEAT", 0), ("CMD_ACK", 1), ("CMD_TEST1", 4)])
        .with_config(config)
        .with_opener(opener)
        .build()
        .expect("demo bindings are unique")
}

fn memory_connection() -> (Connection, MemoryLink) {
    let (opener, remote) = MemoryOpener::with_pair();
    (build(Arc::new(opener), fast_config()), remote)
}

fn open_and_wait(conn: &Connection) {
    conn.open().expect("open should start the loop");
    assert!(
        conn.wait_for_state(TIMEOUT, |s| s == ConnectionState::Connected),
        "connection never reached Connected (state: {})",
        conn.state()
    );
}

fn read_bytes(remote: &mut MemoryLink, count: usize) -> Vec<u8> {
    let deadline = Instant::now() + TIMEOUT;
    let mut out = Vec::new();
    while out.len() < count {
        out.extend(remote.drain());
        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    out
}

fn channel_handler(tx: mpsc::Sender<(CommandKey, u8)>) -> serproto_conn::Handler {
    handler(move |_, key, value| {
        let _ = tx.send((key.clone(), value));
    })
}

/// Fails its first open after a delay, then hands out memory links.
struct FailFirstOpener {
    delay: Duration,
    attempts: AtomicUsize,
    links: MemoryOpener,
}

impl LinkOpener for FailFirstOpener {
    fn open(&self, port: &str, baud: u32) -> serproto_transport::Result<Box<dyn Link>> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            std::thread::sleep(self.delay);
            return Err(TransportError::Open {
                port: port.to_string(),
                baud,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        self.links.open(port, baud)
    }
}

fn stop(conn: &Connection) {
    conn.close();
    conn.join();
}

#[test]
fn concrete_scenario_dispatches_only_matching_handler() {
    let (conn, mut remote) = memory_connection();
    let heartbeats = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&heartbeats);
    conn.register_callback(
        "CMD_HEARTBEAT",
        handler(move |_, _, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    conn.register_callback("CMD_TEST1", channel_handler(tx)).unwrap();

    open_and_wait(&conn);
    remote.write_all(&[0xFF, 0xFE, 4, 123, 127]).unwrap();

    let (key, value) = rx.recv_timeout(TIMEOUT).expect("CMD_TEST1 should fire");
    assert_eq!(key, CommandKey::Named("CMD_TEST1".into()));
    assert_eq!(value, 123);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(heartbeats.load(Ordering::SeqCst), 0);

    stop(&conn);
}

#[test]
fn sends_are_written_in_fifo_order() {
    let (conn, mut remote) = memory_connection();
    open_and_wait(&conn);

    conn.send_command("CMD_TEST1", 123).unwrap();
    conn.send_command("CMD_HEARTBEAT", 2).unwrap();

    assert_eq!(
        read_bytes(&mut remote, 10),
        vec![0xFF, 0xFE, 4, 123, 127, 0xFF, 0xFE, 0, 2, 2]
    );
    assert!(conn.wait_until(TIMEOUT, || conn.stats().frames_sent == 2));

    stop(&conn);
}

#[test]
fn send_value_is_truncated_modulo_256() {
    let (conn, mut remote) = memory_connection();
    open_and_wait(&conn);

    conn.send_command("CMD_ACK", 257).unwrap();
    assert_eq!(read_bytes(&mut remote, 5), vec![0xFF, 0xFE, 1, 1, 2]);

    stop(&conn);
}

#[test]
fn send_while_connecting_is_queued() {
    let (opener, mut remote) = MemoryOpener::with_pair();
    let conn = build(
        Arc::new(opener),
        ConnectionConfig {
            settle_delay: Duration::from_millis(30),
            ..fast_config()
        },
    );

    conn.open().unwrap();
    assert!(conn.state().accepts_sends());
    conn.send_command("CMD_ACK", 9).unwrap();

    assert_eq!(read_bytes(&mut remote, 5), vec![0xFF, 0xFE, 1, 9, 10]);
    stop(&conn);
}

#[test]
fn send_errors_surface_synchronously() {
    let (conn, _remote) = memory_connection();
    assert!(matches!(
        conn.send_command("CMD_ACK", 1),
        Err(ConnError::NotConnected(ConnectionState::Idle))
    ));

    open_and_wait(&conn);
    assert!(matches!(
        conn.send_command("CMD_NOPE", 1),
        Err(ConnError::UnknownCommand(name)) if name == "CMD_NOPE"
    ));

    stop(&conn);
    assert!(matches!(
        conn.send_command("CMD_ACK", 1),
        Err(ConnError::NotConnected(_))
    ));
}

#[test]
fn open_twice_is_rejected() {
    let (conn, _remote) = memory_connection();
    open_and_wait(&conn);
    assert!(matches!(
        conn.open(),
        Err(ConnError::AlreadyOpen(ConnectionState::Connected))
    ));
    stop(&conn);
}

#[test]
fn close_stops_loop_and_allows_reopen() {
    let opener = Arc::new(MemoryOpener::new());
    let (first, _first_remote) = MemoryLink::pair();
    let (second, mut second_remote) = MemoryLink::pair();
    opener.push(first);
    opener.push(second);

    let conn = build(opener.clone(), fast_config());
    open_and_wait(&conn);
    stop(&conn);
    assert_eq!(conn.state(), ConnectionState::Stopped);

    open_and_wait(&conn);
    conn.send_command("CMD_ACK", 1).unwrap();
    assert_eq!(read_bytes(&mut second_remote, 5), vec![0xFF, 0xFE, 1, 1, 2]);
    stop(&conn);

    assert_eq!(opener.opened().len(), 2);
}

#[test]
fn open_failure_stops_and_records_error() {
    let conn = build(Arc::new(MemoryOpener::new()), fast_config());
    conn.open().unwrap();

    assert!(conn.wait_for_state(TIMEOUT, |s| s == ConnectionState::Stopped));
    let err = conn.last_error().expect("open failure should be recorded");
    assert!(err.contains("loop0"), "{err}");
    conn.join();
}

#[test]
fn panicking_callback_does_not_stop_loop() {
    let (conn, mut remote) = memory_connection();
    conn.register_callback("CMD_ACK", handler(|_, _, _| panic!("callback failure")))
        .unwrap();
    let (tx, rx) = mpsc::channel();
    conn.register_callback("CMD_ACK", channel_handler(tx)).unwrap();

    open_and_wait(&conn);
    remote.write_all(&[0xFF, 0xFE, 1, 10, 11]).unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().1, 10);
    remote.write_all(&[0xFF, 0xFE, 1, 20, 21]).unwrap();
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap().1, 20);
    assert!(conn.is_connected());

    stop(&conn);
}

#[test]
fn corrupted_and_unmapped_frames_are_absorbed() {
    let (conn, mut remote) = memory_connection();
    let (tx, rx) = mpsc::channel();
    conn.register_callback("CMD_TEST1", channel_handler(tx)).unwrap();
    open_and_wait(&conn);

    remote.write_all(&[0xFF, 0xFE, 4, 1, 99]).unwrap(); // bad checksum
    remote.write_all(&[0xFF, 0xFE, 200, 7, 207]).unwrap(); // unmapped id
    remote.write_all(&[0xFF, 0xFE, 4, 5, 9]).unwrap();

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), (CommandKey::Named("CMD_TEST1".into()), 5));
    assert!(conn.wait_until(TIMEOUT, || conn.stats().decoder.frames_decoded == 2));
    assert_eq!(conn.stats().decoder.checksum_errors, 1);
    assert!(conn.is_connected());

    stop(&conn);
}

#[test]
fn callback_can_reply_on_its_connection() {
    let (conn, mut remote) = memory_connection();
    conn.register_callback(
        "CMD_HEARTBEAT",
        handler(|conn, _, value| {
            conn.send_command("CMD_ACK", value.wrapping_add(1)).unwrap();
        }),
    )
    .unwrap();
    open_and_wait(&conn);

    remote.write_all(&[0xFF, 0xFE, 0, 5, 5]).unwrap();
    assert_eq!(read_bytes(&mut remote, 5), vec![0xFF, 0xFE, 1, 6, 7]);

    stop(&conn);
}

#[test]
fn remote_hangup_stops_loop() {
    let (conn, remote) = memory_connection();
    open_and_wait(&conn);

    drop(remote);
    assert!(conn.wait_for_state(TIMEOUT, |s| s == ConnectionState::Stopped));
    assert!(conn.last_error().is_some());
    conn.join();
}

#[test]
fn dropping_every_handle_releases_link() {
    let (conn, remote) = memory_connection();
    open_and_wait(&conn);
    drop(conn);

    let deadline = Instant::now() + TIMEOUT;
    while !remote.is_closed() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(remote.is_closed());
}

#[test]
fn scoped_connection_closes_on_drop() {
    let (conn, mut remote) = memory_connection();
    {
        let scoped = conn.scoped().unwrap();
        assert!(scoped.wait_for_state(TIMEOUT, |s| s == ConnectionState::Connected));
        scoped.send_command("CMD_ACK", 3).unwrap();
        assert_eq!(read_bytes(&mut remote, 5), vec![0xFF, 0xFE, 1, 3, 4]);
    }
    assert_eq!(conn.state(), ConnectionState::Stopped);
    assert!(remote.is_closed());
}

#[test]
fn unsent_commands_are_dropped_on_close() {
    let (opener, mut remote) = MemoryOpener::with_pair();
    let conn = build(
        Arc::new(opener),
        ConnectionConfig {
            settle_delay: Duration::from_secs(30),
            ..fast_config()
        },
    );
    open_and_wait(&conn);

    for value in 0..3 {
        conn.send_command("CMD_ACK", value).unwrap();
    }
    stop(&conn);

    assert_eq!(conn.state(), ConnectionState::Stopped);
    assert_eq!(conn.stats().sends_abandoned, 3);
    assert_eq!(conn.pending_sends(), 0);
    assert!(remote.drain().is_empty());
}

#[test]
fn sends_queued_during_failed_open_do_not_leak_into_next_cycle() {
    let (links, mut remote) = MemoryOpener::with_pair();
    let opener = Arc::new(FailFirstOpener {
        delay: Duration::from_millis(200),
        attempts: AtomicUsize::new(0),
        links,
    });
    let conn = build(opener, fast_config());

    conn.open().unwrap();
    assert_eq!(conn.state(), ConnectionState::Connecting);
    conn.send_command("CMD_ACK", 42).unwrap();

    assert!(conn.wait_for_state(TIMEOUT, |s| s == ConnectionState::Stopped));
    assert_eq!(conn.pending_sends(), 0);
    assert_eq!(conn.stats().sends_abandoned, 1);
    conn.join();

    open_and_wait(&conn);
    std::thread::sleep(Duration::from_millis(50));
    assert!(remote.drain().is_empty(), "send from the failed cycle was written");

    conn.send_command("CMD_ACK", 7).unwrap();
    assert_eq!(read_bytes(&mut remote, 5), vec![0xFF, 0xFE, 1, 7, 8]);
    stop(&conn);
}

#[test]
fn sends_after_stop_are_rejected_and_not_queued() {
    let (conn, remote) = memory_connection();
    open_and_wait(&conn);
    drop(remote);
    assert!(conn.wait_for_state(TIMEOUT, |s| s == ConnectionState::Stopped));

    assert!(matches!(
        conn.send_command("CMD_ACK", 1),
        Err(ConnError::NotConnected(ConnectionState::Stopped))
    ));
    assert_eq!(conn.pending_sends(), 0);
    conn.join();
}
