use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use serproto_frame::{CommandKey, CommandTable};
use tracing::{debug, error};

use crate::connection::Connection;
use crate::error::{ConnError, Result};

/// Observer invoked for each received frame of a command.
///
/// Identity is the `Arc` allocation: registering a clone of the same handler
/// twice for one command is a no-op.
pub type Handler = Arc<dyn Fn(&Connection, &CommandKey, u8) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Connection, &CommandKey, u8) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-command ordered handler lists.
pub struct CallbackRegistry {
    table: Arc<CommandTable>,
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl CallbackRegistry {
    /// Create a registry with an empty handler list for every command in `table`.
    pub fn new(table: Arc<CommandTable>) -> Self {
        let handlers = table
            .names()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        Self {
            table,
            handlers: Mutex::new(handlers),
        }
    }

    /// Append `handler` to `command`'s list.
    ///
    /// Returns `Ok(false)` without changing anything if that handler is
    /// already registered for `command`.
    pub fn register(&self, command: &str, handler: Handler) -> Result<bool> {
        self.ensure_known(command)?;
        let mut handlers = self.lock();
        let list = handlers.entry(command.to_string()).or_default();
        if list.iter().any(|existing| Arc::ptr_eq(existing, &handler)) {
            debug!(command, "handler already registered");
            return Ok(false);
        }
        list.push(handler);
        Ok(true)
    }

    /// Remove every handler for `command`.
    pub fn clear(&self, command: &str) -> Result<()> {
        self.ensure_known(command)?;
        if let Some(list) = self.lock().get_mut(command) {
            list.clear();
        }
        Ok(())
    }

    /// Number of handlers registered for `command`.
    pub fn handler_count(&self, command: &str) -> usize {
        self.lock().get(command).map_or(0, Vec::len)
    }

    /// Invoke every handler for `key`, in registration order.
    ///
    /// The list is snapshotted first, so handlers may register, clear or send
    /// on the connection. A panicking handler is logged and skipped. Raw keys
    /// never have handlers. Returns how many handlers completed normally.
    pub fn dispatch(&self, connection: &Connection, key: &CommandKey, value: u8) -> usize {
        let Some(name) = key.name() else {
            return 0;
        };
        let snapshot: Vec<Handler> = match self.lock().get(name) {
            Some(list) => list.clone(),
            None => return 0,
        };

        let mut completed = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(connection, key, value))) {
                Ok(()) => completed += 1,
                Err(payload) => {
                    error!(
                        command = name,
                        value,
                        panic = panic_message(payload.as_ref()),
                        "callback panicked"
                    );
                }
            }
        }
        completed
    }

    fn ensure_known(&self, command: &str) -> Result<()> {
        if self.table.contains(command) {
            Ok(())
        } else {
            Err(ConnError::UnknownCommand(command.to_string()))
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Handler>>> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic>"
    }
}
