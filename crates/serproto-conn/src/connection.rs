use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serproto_frame::{
    truncate_value, CommandBinding, CommandTable, FrameError, FrameReader, FrameWriter,
};
use serproto_transport::{Link, LinkOpener, TransportError};
use tracing::{debug, error, info, warn};

use crate::callbacks::{CallbackRegistry, Handler};
use crate::config::ConnectionConfig;
use crate::error::{ConnError, Result};
use crate::queue::{OutboundQueue, PendingOutput};
use crate::state::{ConnectionState, LinkStats, StateCell};

struct Shared {
    port: String,
    baud: u32,
    table: Arc<CommandTable>,
    callbacks: CallbackRegistry,
    outbound: OutboundQueue,
    state: StateCell,
    stop: AtomicBool,
    config: ConnectionConfig,
    opener: Arc<dyn LinkOpener>,
    worker: Mutex<Option<JoinHandle<()>>>,
    last_error: Mutex<Option<String>>,
    stats: Mutex<LinkStats>,
    frames_sent: AtomicU64,
}

impl Shared {
    /// A `close` may land between `open`'s transition and its reset of the
    /// stop flag, so `Disconnecting` counts as a stop request too.
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || self.state.load() == ConnectionState::Disconnecting
    }
}

/// A framed command link to one device.
///
/// Cloning is cheap and every clone refers to the same link. `open` starts a
/// background loop that owns the transport; the application talks to it only
/// through the outbound queue and the callback registry. The loop exits on
/// `close`, on a fatal transport error, or once every handle has been
/// dropped.
///
/// A handler that captures a clone of its own `Connection` keeps that
/// connection alive through the callback registry, so the loop only stops on
/// `close` or a link failure. Handlers receive the connection as an argument
/// and should use that instead.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

/// Builds a [`Connection`].
pub struct ConnectionBuilder {
    port: String,
    baud: u32,
    bindings: Vec<CommandBinding>,
    config: ConnectionConfig,
    opener: Option<Arc<dyn LinkOpener>>,
}

impl ConnectionBuilder {
    /// Add command bindings, in order.
    pub fn with_commands<I, B>(mut self, bindings: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<CommandBinding>,
    {
        self.bindings.extend(bindings.into_iter().map(Into::into));
        self
    }

    /// Override loop timing.
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `opener` instead of the default serial transport.
    pub fn with_opener(mut self, opener: Arc<dyn LinkOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Validate the command table and create an idle connection.
    pub fn build(self) -> Result<Connection> {
        let table = Arc::new(CommandTable::new(self.bindings)?);
        let opener = match self.opener {
            Some(opener) => opener,
            None => default_opener()?,
        };

        Ok(Connection {
            shared: Arc::new(Shared {
                callbacks: CallbackRegistry::new(Arc::clone(&table)),
                port: self.port,
                baud: self.baud,
                table,
                outbound: OutboundQueue::new(),
                state: StateCell::new(ConnectionState::Idle),
                stop: AtomicBool::new(false),
                config: self.config,
                opener,
                worker: Mutex::new(None),
                last_error: Mutex::new(None),
                stats: Mutex::new(LinkStats::default()),
                frames_sent: AtomicU64::new(0),
            }),
        })
    }
}

#[cfg(feature = "serial")]
fn default_opener() -> Result<Arc<dyn LinkOpener>> {
    Ok(Arc::new(serproto_transport::SerialOpener::default()))
}

#[cfg(not(feature = "serial"))]
fn default_opener() -> Result<Arc<dyn LinkOpener>> {
    Err(ConnError::NoTransport)
}

impl Connection {
    /// Start building a connection to `port` at `baud`.
    pub fn builder(port: impl Into<String>, baud: u32) -> ConnectionBuilder {
        ConnectionBuilder {
            port: port.into(),
            baud,
            bindings: Vec::new(),
            config: ConnectionConfig::default(),
            opener: None,
        }
    }

    /// Serial connection with default timing.
    #[cfg(feature = "serial")]
    pub fn new<I, B>(port: impl Into<String>, baud: u32, bindings: I) -> Result<Self>
    where
        I: IntoIterator<Item = B>,
        B: Into<CommandBinding>,
    {
        Self::builder(port, baud).with_commands(bindings).build()
    }

    /// Start the communication loop and return without waiting for the link.
    ///
    /// Fails with [`ConnError::AlreadyOpen`] unless the connection is idle or
    /// stopped.
    pub fn open(&self) -> Result<()> {
        self.shared
            .state
            .transition(&ConnectionState::OPENABLE, ConnectionState::Connecting)
            .map_err(ConnError::AlreadyOpen)?;

        // A previous loop has already reported `Stopped`; reap its thread.
        let previous = lock(&self.shared.worker).take();
        if let Some(previous) = previous {
            if previous.join().is_err() {
                error!(port = %self.shared.port, "previous communication loop panicked");
            }
        }

        self.shared.stop.store(false, Ordering::SeqCst);
        *lock(&self.shared.last_error) = None;
        *lock(&self.shared.stats) = LinkStats::default();
        self.shared.frames_sent.store(0, Ordering::SeqCst);

        debug!(port = %self.shared.port, baud = self.shared.baud, "connecting");

        let weak = Arc::downgrade(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("serproto-{}", self.shared.port))
            .spawn(move || run_loop(weak));

        match spawned {
            Ok(handle) => {
                *lock(&self.shared.worker) = Some(handle);
                Ok(())
            }
            Err(err) => {
                finish_cycle(&self.shared);
                Err(ConnError::Spawn(err))
            }
        }
    }

    /// Ask the communication loop to stop. Does not wait for it.
    ///
    /// Sends still queued when the loop notices are dropped.
    pub fn close(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        let _ = self.shared.state.transition(
            &[ConnectionState::Connecting, ConnectionState::Connected],
            ConnectionState::Disconnecting,
        );
        debug!(port = %self.shared.port, "disconnecting");
    }

    /// Block until the communication loop thread has exited.
    ///
    /// Returns immediately when no loop was started, or when called from the
    /// loop thread itself (e.g. inside a callback).
    pub fn join(&self) {
        let mut worker = lock(&self.shared.worker);
        let on_loop_thread = worker
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id());
        if on_loop_thread {
            return;
        }
        let handle = worker.take();
        drop(worker);
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(port = %self.shared.port, "communication loop panicked");
            }
        }
    }

    /// Open now and close (then join) when the returned guard drops.
    pub fn scoped(&self) -> Result<ScopedConnection<'_>> {
        self.open()?;
        Ok(ScopedConnection { connection: self })
    }

    /// Queue `command` with `value` (reduced modulo 256) for transmission.
    ///
    /// Returns once queued; delivery is asynchronous and unacknowledged.
    pub fn send_command(&self, command: &str, value: impl Into<i64>) -> Result<()> {
        let shared = &self.shared;
        let value = truncate_value(value.into());
        let item = PendingOutput {
            command: command.to_string(),
            value,
        };

        // The state is checked under the queue lock so a send cannot slip in
        // after the loop's final drain.
        shared.outbound.push_if(item, || {
            let state = shared.state.load();
            if !state.accepts_sends() {
                return Err(ConnError::NotConnected(state));
            }
            if !shared.table.contains(command) {
                return Err(ConnError::UnknownCommand(command.to_string()));
            }
            Ok(())
        })?;
        debug!(command, value, "queueing command");
        Ok(())
    }

    /// Register `handler` for `command`. Registering the same handler twice is a no-op.
    ///
    /// Returns whether the handler was added.
    pub fn register_callback(&self, command: &str, handler: Handler) -> Result<bool> {
        self.shared.callbacks.register(command, handler)
    }

    /// Remove every handler for `command`.
    pub fn clear_callbacks(&self, command: &str) -> Result<()> {
        self.shared.callbacks.clear(command)
    }

    /// Number of handlers registered for `command`.
    pub fn callback_count(&self, command: &str) -> usize {
        self.shared.callbacks.handler_count(command)
    }

    pub fn port(&self) -> &str {
        &self.shared.port
    }

    pub fn baud(&self) -> u32 {
        self.shared.baud
    }

    pub fn commands(&self) -> &Arc<CommandTable> {
        &self.shared.table
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Sends queued but not yet written.
    pub fn pending_sends(&self) -> usize {
        self.shared.outbound.len()
    }

    /// Why the last loop stopped on its own, if it did.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.shared.last_error).clone()
    }

    /// Counters for the current or most recent open/close cycle.
    pub fn stats(&self) -> LinkStats {
        let mut stats = *lock(&self.shared.stats);
        stats.frames_sent = self.shared.frames_sent.load(Ordering::SeqCst);
        stats
    }

    /// Poll `state` until `predicate` holds or `timeout` elapses.
    pub fn wait_for_state(
        &self,
        timeout: Duration,
        predicate: impl Fn(ConnectionState) -> bool,
    ) -> bool {
        self.wait_until(timeout, || predicate(self.state()))
    }

    /// Poll `condition` every millisecond until it holds or `timeout` elapses.
    ///
    /// Useful for waiting on [`stats`](Self::stats), e.g. until a send has
    /// been written.
    pub fn wait_until(&self, timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if condition() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// One loop iteration: drain input and dispatch, then write at most one send.
    fn step(
        &self,
        link: &mut dyn Link,
        reader: &mut FrameReader,
        writer: &mut FrameWriter,
    ) -> std::result::Result<(), TransportError> {
        let shared = &self.shared;

        match reader.poll(link) {
            Ok(frames) => {
                for frame in frames {
                    let key = shared.table.key_for(frame.command_id);
                    if key.is_named() {
                        debug!(command = %key, value = frame.value, "received");
                    } else {
                        debug!(command_id = frame.command_id, value = frame.value, "received unmapped command id");
                    }
                    shared.callbacks.dispatch(self, &key, frame.value);
                }
            }
            Err(err) => absorb_or_fail(err, "read")?,
        }
        lock(&shared.stats).decoder = reader.stats();

        if let Some(item) = shared.outbound.pop() {
            match writer.send(link, &shared.table, &item.command, i64::from(item.value)) {
                Ok(_) => {
                    shared.frames_sent.fetch_add(1, Ordering::SeqCst);
                    debug!(command = %item.command, value = item.value, "sent");
                }
                Err(err) => absorb_or_fail(err, "write")?,
            }
        }

        Ok(())
    }
}

/// Transient errors are logged and swallowed; a dead link ends the loop.
fn absorb_or_fail(err: FrameError, op: &str) -> std::result::Result<(), TransportError> {
    match err {
        FrameError::Transport(err) if err.is_fatal() => Err(err),
        other => {
            warn!(error = %other, op, "transient link error");
            Ok(())
        }
    }
}

fn run_loop(weak: Weak<Shared>) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let port = shared.port.clone();
    let baud = shared.baud;
    let config = shared.config.clone();

    let mut link = match shared.opener.open(&port, baud) {
        Ok(link) => link,
        Err(err) => {
            error!(port = %port, baud, error = %err, "failed to open link");
            *lock(&shared.last_error) = Some(err.to_string());
            finish_cycle(&shared);
            return;
        }
    };

    // A close during `Connecting` leaves the state at `Disconnecting`.
    let _ = shared.state.transition(&[ConnectionState::Connecting], ConnectionState::Connected);
    info!(port = %port, baud, transport = link.transport_name(), "link connected");
    drop(shared);

    settle(&weak, config.settle_delay, config.poll_interval);

    let mut reader = FrameReader::with_config(config.frame.clone());
    let mut writer = FrameWriter::new();

    loop {
        let Some(shared) = weak.upgrade() else {
            debug!(port = %port, "all connection handles dropped");
            break;
        };
        if shared.stop_requested() {
            break;
        }

        let connection = Connection { shared };
        if let Err(err) = connection.step(link.as_mut(), &mut reader, &mut writer) {
            error!(port = %port, error = %err, "link failed");
            *lock(&connection.shared.last_error) = Some(err.to_string());
            break;
        }
        drop(connection);

        thread::sleep(config.poll_interval);
    }

    if let Err(err) = link.close() {
        warn!(port = %port, error = %err, "error closing link");
    }
    drop(link);

    if let Some(shared) = weak.upgrade() {
        finish_cycle(&shared);
    }
    info!(port = %port, "link closed");
}

/// Drop unsent commands and publish `Stopped` under the queue lock, so no
/// send from this cycle survives into the next one.
fn finish_cycle(shared: &Shared) {
    let abandoned = shared.outbound.clear_then(|abandoned| {
        lock(&shared.stats).sends_abandoned = abandoned as u64;
        shared.state.store(ConnectionState::Stopped);
    });
    if abandoned > 0 {
        debug!(port = %shared.port, abandoned, "dropping unsent commands");
    }
}

/// Sleep for the settle delay, waking early if the loop is asked to stop.
fn settle(weak: &Weak<Shared>, delay: Duration, slice: Duration) {
    let deadline = Instant::now() + delay;
    let slice = slice.max(Duration::from_millis(1));
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        match weak.upgrade() {
            Some(shared) if !shared.stop_requested() => {}
            _ => return,
        }
        thread::sleep(slice.min(deadline - now));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("port", &self.shared.port)
            .field("baud", &self.shared.baud)
            .field("state", &self.state())
            .field("commands", &self.shared.table.len())
            .field("pending_sends", &self.pending_sends())
            .finish()
    }
}

/// An open connection that closes and joins its loop when dropped.
pub struct ScopedConnection<'a> {
    connection: &'a Connection,
}

impl Deref for ScopedConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.connection
    }
}

impl Drop for ScopedConnection<'_> {
    fn drop(&mut self) {
        self.connection.close();
        self.connection.join();
    }
}
