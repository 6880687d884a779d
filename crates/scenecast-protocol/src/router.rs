//! The command router: maps identifiers to handlers and dispatches
//! inbound messages.
//!
//! Handlers take the endpoint's state as `&mut C` instead of capturing it,
//! so the router itself holds no endpoint state and one router can serve
//! every connection of an endpoint. The registry lock is only held while
//! looking a handler up, never while the handler runs. A handler may
//! therefore register or unregister handlers (including itself) without
//! deadlocking or disturbing the dispatch in progress.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::{CommandFrame, ProtocolError};

/// A registered callback. Receives the endpoint state and the payload
/// (everything after the identifier; its length is the slice length).
pub type Handler<C> = Arc<dyn Fn(&mut C, &[u8]) + Send + Sync>;

/// Token returned by [`CommandRouter::register`], needed to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// What [`CommandRouter::dispatch`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Exactly one handler ran.
    Handled,
    /// Nothing is registered for the identifier; the message was dropped.
    Unhandled,
}

struct Entry<C> {
    id: HandlerId,
    handler: Handler<C>,
}

/// Maps command identifiers to handlers.
pub struct CommandRouter<C> {
    handlers: RwLock<HashMap<String, Entry<C>>>,
    next_id: AtomicU64,
}

impl<C> CommandRouter<C> {
    /// Creates a router with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `handler` for `command`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::DuplicateHandler`] if the identifier is
    /// already taken; the existing handler stays in place.
    pub fn register<F>(&self, command: &str, handler: F) -> Result<HandlerId, ProtocolError>
    where
        F: Fn(&mut C, &[u8]) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(command) {
            return Err(ProtocolError::DuplicateHandler(command.to_owned()));
        }
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        handlers.insert(
            command.to_owned(),
            Entry {
                id,
                handler: Arc::new(handler),
            },
        );
        tracing::trace!(command, "handler registered");
        Ok(id)
    }

    /// Removes the handler `id` from `command`.
    ///
    /// Returns `false` (and leaves the registry alone) if `id` is not the
    /// handler currently registered for `command`.
    pub fn unregister(&self, command: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        match handlers.get(command) {
            Some(entry) if entry.id == id => {
                handlers.remove(command);
                tracing::trace!(command, "handler unregistered");
                true
            }
            _ => false,
        }
    }

    /// Removes whatever handler is registered for `command`.
    pub fn unregister_all(&self, command: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(command)
            .is_some()
    }

    /// Returns `true` if `command` has a handler.
    pub fn is_registered(&self, command: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(command)
    }

    /// Reads the identifier from `message` and runs its handler.
    ///
    /// Unknown identifiers are not an error: peers may speak commands this
    /// instance does not understand.
    ///
    /// # Errors
    /// Returns an error only if the identifier itself cannot be parsed.
    pub fn dispatch(&self, ctx: &mut C, message: &[u8]) -> Result<Dispatch, ProtocolError> {
        let frame = CommandFrame::parse(message)?;

        // Clone the handler out so the lock is released before it runs.
        let handler = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            handlers.get(frame.command).map(|e| Arc::clone(&e.handler))
        };

        match handler {
            Some(handler) => {
                tracing::trace!(
                    command = frame.command,
                    bytes = frame.payload.len(),
                    "dispatching"
                );
                handler(ctx, frame.payload);
                Ok(Dispatch::Handled)
            }
            None => {
                tracing::trace!(command = frame.command, "no handler, dropping");
                Ok(Dispatch::Unhandled)
            }
        }
    }
}

impl<C> Default for CommandRouter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for CommandRouter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut commands: Vec<&str> = handlers.keys().map(String::as_str).collect();
        commands.sort_unstable();
        f.debug_struct("CommandRouter")
            .field("commands", &commands)
            .finish()
    }
}
