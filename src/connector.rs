// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 wirenet contributors

//! Reconnect-with-backoff for one logical outbound link.
//!
//! A [`Connector`] owns the current channel for one remote endpoint and
//! re-establishes it on demand. Each reconnect attempt runs on its own
//! short-lived named thread: sleep for the backoff delay, invoke the
//! injected connect function, hand the new channel to the closeable
//! registry, and publish it in the current-channel slot.
//!
//! The connect thread may race a concurrent teardown: a registry that
//! reports [`AlreadyClosed`] means the reactor is gone, and the freshly
//! connected channel is discarded quietly. No retry is scheduled from inside
//! the attempt - scheduling the next attempt is the caller's call via
//! another `connect_later`.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::channel::Channel;
use crate::registry::{AlreadyClosed, CloseableRegistry};

/// Attempt counter saturation point.
pub const MAX_CONNECTION_ATTEMPTS: u32 = 5;

const RECONNECT_STEP_MS: u64 = 100;
const MAX_RECONNECT_DELAY_MS: u64 = 400;

/// Backoff delay for the given attempt count, capped at 400 ms.
fn reconnect_delay(attempts: u32) -> Duration {
    Duration::from_millis((u64::from(attempts) * RECONNECT_STEP_MS).min(MAX_RECONNECT_DELAY_MS))
}

type ConnectFn = dyn Fn() -> io::Result<Channel> + Send + Sync;
type ConnectedHook = dyn Fn(&Arc<Channel>) + Send + Sync;

/// Manages asynchronous (re)connection attempts for one outbound link.
pub struct Connector {
    name: String,

    /// Saturating attempt counter, reset by `set_successfully_connected`
    attempts: u32,

    /// The live channel, replaced on every attempt
    current: Arc<Mutex<Option<Arc<Channel>>>>,

    registry: Arc<CloseableRegistry>,

    connect_fn: Arc<ConnectFn>,

    /// Invoked after a new channel has been registered and published
    on_connected: Option<Arc<ConnectedHook>>,
}

impl Connector {
    pub fn new(
        name: impl Into<String>,
        registry: Arc<CloseableRegistry>,
        connect_fn: impl Fn() -> io::Result<Channel> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            attempts: 0,
            current: Arc::new(Mutex::new(None)),
            registry,
            connect_fn: Arc::new(connect_fn),
            on_connected: None,
        }
    }

    /// Attach a hook that runs on the connect thread once a channel is
    /// registered; typically used to enqueue reactor registration.
    pub fn with_on_connected(
        mut self,
        hook: impl Fn(&Arc<Channel>) + Send + Sync + 'static,
    ) -> Self {
        self.on_connected = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The channel from the last successful attempt, if any.
    pub fn current_channel(&self) -> Option<Arc<Channel>> {
        self.current.lock().clone()
    }

    /// Connect immediately. Used for the first attempt; does not discard the
    /// current channel or advance the attempt counter.
    pub fn connect(&self) {
        self.spawn_connect(Duration::ZERO);
    }

    /// Discard the current channel and reconnect after a backoff delay
    /// proportional to the attempt count.
    pub fn connect_later(&mut self) {
        if let Some(channel) = self.current.lock().take() {
            if let Err(e) = channel.close() {
                log::debug!("[{}] discarding stale channel failed: {}", self.name, e);
            }
        }

        let delay = reconnect_delay(self.attempts);
        if self.attempts < MAX_CONNECTION_ATTEMPTS {
            self.attempts += 1;
        }
        self.spawn_connect(delay);
    }

    /// Reset the attempt counter. Call once the protocol handshake has
    /// completed, not merely on transport connect.
    pub fn set_successfully_connected(&mut self) {
        self.attempts = 0;
    }

    fn spawn_connect(&self, delay: Duration) {
        let name = self.name.clone();
        let registry = Arc::clone(&self.registry);
        let connect_fn = Arc::clone(&self.connect_fn);
        let current = Arc::clone(&self.current);
        let on_connected = self.on_connected.clone();

        let spawned = thread::Builder::new().name(self.name.clone()).spawn(move || {
            if delay > Duration::ZERO {
                thread::sleep(delay);
            }

            let channel = match connect_fn() {
                Ok(channel) => Arc::new(channel),
                Err(e) => {
                    log::debug!("[{}] connect attempt failed: {}", name, e);
                    return;
                }
            };

            // close() may have run while this thread slept; an already
            // closed registry wins and the channel is discarded quietly.
            match registry.register(channel.clone()) {
                Ok(()) => {}
                Err(AlreadyClosed) => {
                    let _ = channel.close();
                    return;
                }
            }

            *current.lock() = Some(Arc::clone(&channel));

            if let Some(hook) = on_connected {
                hook(&channel);
            }
        });

        if let Err(e) = spawned {
            log::warn!("[{}] failed to spawn connect thread: {}", self.name, e);
        }
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("name", &self.name)
            .field("attempts", &self.attempts)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn refused_connector() -> Connector {
        Connector::new("test-connector", Arc::new(CloseableRegistry::new()), || {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "nobody home"))
        })
    }

    #[test]
    fn backoff_grows_linearly_and_caps_at_400ms() {
        assert_eq!(reconnect_delay(0), Duration::ZERO);
        assert_eq!(reconnect_delay(1), Duration::from_millis(100));
        assert_eq!(reconnect_delay(4), Duration::from_millis(400));
        assert_eq!(reconnect_delay(5), Duration::from_millis(400));
    }

    #[test]
    fn attempts_saturate_at_five() {
        let mut connector = refused_connector();
        let mut delays = Vec::new();
        for _ in 0..6 {
            delays.push(reconnect_delay(connector.attempts()));
            connector.connect_later();
        }

        assert_eq!(connector.attempts(), MAX_CONNECTION_ATTEMPTS);
        // The sixth attempt's delay equals the fifth's: the 400 ms cap.
        assert_eq!(delays[4], Duration::from_millis(400));
        assert_eq!(delays[5], delays[4]);
    }

    #[test]
    fn success_resets_the_counter() {
        let mut connector = refused_connector();
        for _ in 0..3 {
            connector.connect_later();
        }
        assert_eq!(connector.attempts(), 3);

        connector.set_successfully_connected();
        assert_eq!(connector.attempts(), 0);
    }

    #[test]
    fn failed_connect_leaves_no_current_channel() {
        let connector = refused_connector();
        connector.connect();
        std::thread::sleep(Duration::from_millis(100));
        assert!(connector.current_channel().is_none());
    }
}
