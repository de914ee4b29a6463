// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 wirenet contributors

//! Channel handles and the callback sink.
//!
//! A [`Channel`] wraps one non-blocking TCP stream together with its poll
//! binding. The reactor thread performs all reads and writes; other threads
//! only ever close the channel or toggle its write interest, so the stream
//! sits behind a mutex that is uncontended in steady state.
//!
//! Write interest is the unit of throttling: dropping it stops writable
//! readiness for the channel until it is re-enabled.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use parking_lot::Mutex;

use crate::registry::Closeable;
use crate::wire::IoBuffer;

static NEXT_CHANNEL_ID: AtomicUsize = AtomicUsize::new(1);

// ============================================================================
// Callback sink
// ============================================================================

/// Channel lifecycle events delivered to the attached callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    /// The channel was registered with a reactor
    Connected,

    /// The channel was closed by the reactor (peer EOF, I/O failure, or
    /// teardown)
    Closed,
}

/// Sink notified of a channel's lifecycle events.
///
/// The buffers are passed when the event fires during dispatch and the
/// channel's I/O state is still live; `Closed` is delivered without them.
pub trait ChannelCallback: Send {
    fn on_event(
        &mut self,
        input: Option<&mut IoBuffer>,
        output: Option<&mut IoBuffer>,
        event: EventType,
    );
}

// ============================================================================
// Write interest
// ============================================================================

/// A channel whose write readiness can be toggled.
///
/// The throttler tracks channels through this trait only, keyed by
/// [`WriteInterest::key`], so it never touches the poll handle itself.
pub trait WriteInterest: Send + Sync {
    /// Stable key identifying the channel in tracked sets.
    fn key(&self) -> usize;

    fn set_write_interest(&self, enabled: bool) -> io::Result<()>;
}

// ============================================================================
// Channel
// ============================================================================

struct Binding {
    registry: Registry,
    token: Token,
}

/// Handle to one registered TCP stream.
pub struct Channel {
    /// Process-unique channel key
    id: usize,

    /// Poll binding, present once registered
    binding: Mutex<Option<Binding>>,

    /// The stream itself; `None` once closed
    stream: Mutex<Option<TcpStream>>,

    /// Whether write interest is currently registered
    write_interest: AtomicBool,

    closed: AtomicBool,
}

impl Channel {
    /// Wrap an already non-blocking mio stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            binding: Mutex::new(None),
            stream: Mutex::new(Some(stream)),
            write_interest: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Wrap a std stream, switching it to non-blocking mode.
    pub fn from_std(stream: std::net::TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        let _ = stream.set_nodelay(true);
        Ok(Self::from_stream(TcpStream::from_std(stream)))
    }

    /// Open a connection. Blocks until the transport connect completes, so
    /// call this from a connector thread, never from the reactor thread.
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        Self::from_std(std::net::TcpStream::connect(addr)?)
    }

    /// Stable key identifying this channel.
    pub fn channel_id(&self) -> usize {
        self.id
    }

    pub fn token(&self) -> Option<Token> {
        self.binding.lock().as_ref().map(|b| b.token)
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.lock().as_ref().ok_or_else(closed_err)?.peer_addr()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether write interest is currently registered.
    pub fn write_interest(&self) -> bool {
        self.write_interest.load(Ordering::Acquire)
    }

    /// Register with a poll handle. Called from the reactor thread during
    /// registration handoff.
    pub(crate) fn bind(
        &self,
        registry: Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        let mut binding = self.binding.lock();
        let mut stream = self.stream.lock();
        let stream = stream.as_mut().ok_or_else(closed_err)?;
        registry.register(stream, token, interests)?;
        *binding = Some(Binding { registry, token });
        self.write_interest.store(interests.is_writable(), Ordering::Release);
        Ok(())
    }

    pub(crate) fn read_into(&self, buf: &mut IoBuffer) -> io::Result<usize> {
        let mut stream = self.stream.lock();
        let stream = stream.as_mut().ok_or_else(closed_err)?;
        buf.fill_from(stream)
    }

    pub(crate) fn write_from(&self, bytes: &[u8]) -> io::Result<usize> {
        let mut stream = self.stream.lock();
        let stream = stream.as_mut().ok_or_else(closed_err)?;
        stream.write(bytes)
    }

    /// Close the channel: deregister from the poll handle, shut the socket
    /// down, release the stream. Idempotent.
    pub fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let binding = self.binding.lock().take();
        let stream = self.stream.lock().take();
        if let Some(mut stream) = stream {
            if let Some(binding) = binding {
                let _ = binding.registry.deregister(&mut stream);
            }
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl WriteInterest for Channel {
    fn key(&self) -> usize {
        self.id
    }

    fn set_write_interest(&self, enabled: bool) -> io::Result<()> {
        let binding = self.binding.lock();
        let Some(binding) = binding.as_ref() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "channel not registered"));
        };
        let mut stream = self.stream.lock();
        let stream = stream.as_mut().ok_or_else(closed_err)?;

        let interests = if enabled {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        binding.registry.reregister(stream, binding.token, interests)?;
        self.write_interest.store(enabled, Ordering::Release);
        Ok(())
    }
}

impl Closeable for Channel {
    fn close(&self) -> io::Result<()> {
        Channel::close(self)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("token", &self.token())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn closed_err() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel closed")
}

// ============================================================================
// Tests
// ============================================================================
