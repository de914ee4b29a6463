// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 wirenet contributors

//! The reactor core: one polling handle, one dedicated thread.
//!
//! A [`Reactor`] owns a `mio::Poll` and a single named thread that drives
//! it. Every tick the thread drains the pending-registration queue, waits
//! for readiness, dispatches ready channels through their frame handlers,
//! and gives the throttler its interval check - unconditionally, so idle
//! reactors still roll their throttle windows.
//!
//! # Registration handoff
//!
//! Channels are registered only on the reactor thread. Any thread may
//! enqueue a registration task; the queue is FIFO and a failing task is
//! logged without stopping the drain. A `mio::Waker` nudges the poll so
//! handoff latency is bounded by wake delivery, not by the poll timeout.
//!
//! # Teardown handshake
//!
//! `close` sets the closed flag, closes every registry-held resource
//! quietly, wakes the thread, and then waits - bounded, with a diagnostic
//! dump per retry - for the thread to exit. Destroying state the reactor
//! thread might still touch is what the wait prevents; if the thread never
//! exits within the retry budget, `close` gives up and returns anyway.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::queue::SegQueue;
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::{Condvar, Mutex};

use crate::channel::{Channel, ChannelCallback, EventType};
use crate::config::ReactorConfig;
use crate::ready_set::{ReadyEvent, ReadySet};
use crate::registry::{AlreadyClosed, CloseableRegistry};
use crate::throttle::Throttler;
use crate::wire::{FrameDispatcher, FrameHandler, IoBuffer, FRAME_HEADER_SIZE, MAX_FRAME_BODY};

/// Token reserved for the cross-thread waker.
const WAKER_TOKEN: Token = Token(0);

/// First token handed to a registered channel.
const CHANNEL_TOKEN_START: usize = 1;

/// A deferred registration task, executed on the reactor thread.
pub type Registration = Box<dyn FnOnce(&mut ReactorContext<'_>) -> io::Result<()> + Send>;

// ============================================================================
// Shared state
// ============================================================================

/// State reachable from threads other than the reactor thread.
struct Shared {
    name: String,
    config: ReactorConfig,

    /// Multi-producer registration queue, drained only by the reactor thread
    pending: SegQueue<Registration>,

    /// Cheap signal that the queue is non-empty
    has_pending: AtomicBool,

    closed: AtomicBool,

    waker: Waker,

    closeables: Arc<CloseableRegistry>,

    /// Present only when the throttle rate is non-zero
    throttler: Option<Arc<Throttler>>,

    /// Exit latch for the close handshake
    exited: Mutex<bool>,
    exited_cv: Condvar,
}

/// State confined to the reactor thread.
struct LoopState {
    poll: Poll,
    events: Events,

    /// Installed double-buffered ready set; `None` falls back to walking
    /// `events` directly
    ready: Option<ReadySet>,

    channels: HashMap<Token, ChannelIo>,
    next_token: usize,
}

/// Per-channel dispatch state, owned by the reactor thread.
struct ChannelIo {
    channel: Arc<Channel>,
    input: IoBuffer,
    output: IoBuffer,

    /// Flush cursor into `output` for partial socket writes
    out_sent: usize,

    dispatcher: FrameDispatcher,
    handler: Box<dyn FrameHandler>,
    callback: Option<Box<dyn ChannelCallback>>,
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Closed,
}

// ============================================================================
// Registration context
// ============================================================================

/// Handed to registration tasks running on the reactor thread.
pub struct ReactorContext<'a> {
    name: &'a str,
    config: &'a ReactorConfig,
    registry: &'a mio::Registry,
    channels: &'a mut HashMap<Token, ChannelIo>,
    next_token: &'a mut usize,
    closeables: &'a Arc<CloseableRegistry>,
    throttler: Option<&'a Arc<Throttler>>,
}

impl ReactorContext<'_> {
    /// Register a channel with the poll handle and hand its I/O to the
    /// given frame handler.
    ///
    /// The channel becomes registry-owned; when `throttled` is set it also
    /// joins the throttler's tracked set. The callback, if any, receives a
    /// `Connected` event immediately.
    pub fn register_channel(
        &mut self,
        channel: Arc<Channel>,
        handler: Box<dyn FrameHandler>,
        callback: Option<Box<dyn ChannelCallback>>,
        throttled: bool,
    ) -> io::Result<Token> {
        debug_assert!(
            self.config.input_buffer_size >= FRAME_HEADER_SIZE + MAX_FRAME_BODY,
            "input buffer cannot hold a maximum-size frame"
        );

        let token = Token(*self.next_token);
        *self.next_token += 1;

        channel.bind(
            self.registry.try_clone()?,
            token,
            Interest::READABLE | Interest::WRITABLE,
        )?;

        if self.closeables.register(channel.clone()).is_err() {
            // Teardown won the race; the channel must not outlive it.
            let _ = channel.close();
            return Err(io::Error::other("reactor already shut down"));
        }

        if throttled {
            if let Some(throttler) = self.throttler {
                throttler.add(channel.clone());
            }
        }

        let mut input = IoBuffer::with_capacity(self.config.input_buffer_size);
        input.set_limit(0);
        let output = IoBuffer::with_capacity(self.config.output_buffer_size);

        let mut io = ChannelIo {
            channel,
            input,
            output,
            out_sent: 0,
            dispatcher: FrameDispatcher::new(self.config.frame_limits.clone()),
            handler,
            callback,
        };

        if let Some(callback) = io.callback.as_mut() {
            callback.on_event(None, None, EventType::Connected);
        }

        log::debug!(
            "[{}] registered channel {} as {:?} (peer {:?})",
            self.name,
            io.channel.channel_id(),
            token,
            io.channel.peer_addr().ok()
        );
        self.channels.insert(token, io);
        Ok(token)
    }
}

// ============================================================================
// Reactor
// ============================================================================

/// A single-threaded, selector-driven event loop instance.
pub struct Reactor {
    shared: Arc<Shared>,

    /// Loop state, handed to the thread by `start`
    state: Mutex<Option<LoopState>>,

    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Reactor {
    /// Create a reactor with the given name and configuration. The thread
    /// is not launched until [`Reactor::start`].
    pub fn new(name: impl Into<String>, config: ReactorConfig) -> io::Result<Self> {
        let name = name.into();
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;

        let throttler = config
            .throttling
            .is_enabled()
            .then(|| Arc::new(Throttler::new(&config.throttling)));

        let ready = config
            .ready_set
            .then(|| ReadySet::with_capacity(config.events_capacity));

        let state = LoopState {
            poll,
            events: Events::with_capacity(config.events_capacity),
            ready,
            channels: HashMap::new(),
            next_token: CHANNEL_TOKEN_START,
        };

        let shared = Arc::new(Shared {
            name,
            config,
            pending: SegQueue::new(),
            has_pending: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            waker,
            closeables: Arc::new(CloseableRegistry::new()),
            throttler,
            exited: Mutex::new(false),
            exited_cv: Condvar::new(),
        });

        Ok(Self { shared, state: Mutex::new(Some(state)), thread: Mutex::new(None) })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The registry owning every channel registered with this reactor.
    pub fn closeables(&self) -> &Arc<CloseableRegistry> {
        &self.shared.closeables
    }

    pub fn throttler(&self) -> Option<&Arc<Throttler>> {
        self.shared.throttler.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Launch the reactor thread.
    pub fn start(&self) -> io::Result<()> {
        let Some(state) = self.state.lock().take() else {
            return Err(io::Error::other("reactor already started"));
        };

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || run_loop(state, &shared))?;

        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Enqueue a registration task for the reactor thread. Callable from any
    /// thread, including the reactor's own.
    pub fn add_pending_registration(&self, task: Registration) -> Result<(), AlreadyClosed> {
        if self.is_closed() {
            return Err(AlreadyClosed);
        }
        self.shared.pending.push(task);
        self.shared.has_pending.store(true, Ordering::Release);
        if let Err(e) = self.shared.waker.wake() {
            log::debug!("[{}] wake failed: {}", self.shared.name, e);
        }
        Ok(())
    }

    /// Shut the reactor down and wait (bounded) for its thread to exit.
    /// Idempotent.
    ///
    /// The wait is part of the contract: state owned by this instance must
    /// not be destroyed while the reactor thread can still touch it. Each
    /// retry emits a diagnostic dump; when the budget is exhausted the
    /// method returns without the thread having exited.
    pub fn close(&self) {
        self.close_resources();
        if let Err(e) = self.shared.waker.wake() {
            log::debug!("[{}] wake on close failed: {}", self.shared.name, e);
        }

        let handle = self.thread.lock().take();
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Closing from inside the reactor thread; joining would deadlock.
            return;
        }

        let started = Instant::now();
        {
            let mut exited = self.shared.exited.lock();
            let mut retries = 0;
            while !*exited && retries < self.shared.config.join_retries {
                let result = self
                    .shared
                    .exited_cv
                    .wait_for(&mut exited, self.shared.config.join_retry_interval);
                if result.timed_out() {
                    retries += 1;
                    log::warn!(
                        "[{}] reactor thread still running after {:.1}s \
                         (finished={}, pending_registrations={})",
                        self.shared.name,
                        started.elapsed().as_secs_f64(),
                        handle.is_finished(),
                        self.shared.pending.len(),
                    );
                }
            }
            if !*exited {
                log::error!(
                    "[{}] reactor thread did not exit within {:.1}s; abandoning join",
                    self.shared.name,
                    started.elapsed().as_secs_f64(),
                );
                return;
            }
        }

        if let Err(panic) = handle.join() {
            log::error!("[{}] reactor thread panicked: {:?}", self.shared.name, panic);
        }
    }

    /// Mark the reactor closed and close every registry-held resource
    /// quietly. Does not wait for the thread; `close` does.
    pub fn close_resources(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("[{}] closing reactor resources", self.shared.name);
        self.shared.closeables.close_all();
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// Event loop
// ============================================================================

/// Flips the exit latch when the reactor thread leaves `run_loop`, on any
/// path including a panicking handler.
struct ExitLatch<'a>(&'a Shared);

impl Drop for ExitLatch<'_> {
    fn drop(&mut self) {
        *self.0.exited.lock() = true;
        self.0.exited_cv.notify_all();
    }
}

fn run_loop(mut state: LoopState, shared: &Shared) {
    let _latch = ExitLatch(shared);
    log::debug!("[{}] reactor thread started", shared.name);

    while !shared.closed.load(Ordering::Acquire) {
        if let Err(e) = process_event(&mut state, shared) {
            log::error!("[{}] event loop failed: {}", shared.name, e);
            break;
        }
    }

    state.channels.clear();
    log::debug!("[{}] reactor thread exited", shared.name);
}

/// One tick: drain registrations, wait for readiness, dispatch, check the
/// throttle interval.
fn process_event(state: &mut LoopState, shared: &Shared) -> io::Result<()> {
    if shared.has_pending.swap(false, Ordering::AcqRel) {
        register_pending_registrations(state, shared);
    }

    match state.poll.poll(&mut state.events, Some(shared.config.poll_timeout)) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
        Err(e) => return Err(e),
    }

    let mut ready = state.ready.take();
    match ready.as_mut() {
        Some(set) => {
            for event in state.events.iter() {
                if event.token() == WAKER_TOKEN {
                    continue;
                }
                set.push(ReadyEvent::new(
                    event.token(),
                    event.is_readable(),
                    event.is_writable(),
                ));
            }
            for event in set.flip() {
                dispatch(&mut state.channels, shared, *event);
            }
        }
        None => {
            for event in state.events.iter() {
                if event.token() == WAKER_TOKEN {
                    continue;
                }
                dispatch(
                    &mut state.channels,
                    shared,
                    ReadyEvent::new(event.token(), event.is_readable(), event.is_writable()),
                );
            }
        }
    }
    state.ready = ready;

    // Unconditional so intervals roll over promptly even when idle.
    if let Some(throttler) = shared.throttler.as_ref() {
        throttler.check_throttle_interval();
    }

    Ok(())
}

/// Drain the registration queue in FIFO order. A failing task is logged and
/// the drain continues.
fn register_pending_registrations(state: &mut LoopState, shared: &Shared) {
    let mut ctx = ReactorContext {
        name: &shared.name,
        config: &shared.config,
        registry: state.poll.registry(),
        channels: &mut state.channels,
        next_token: &mut state.next_token,
        closeables: &shared.closeables,
        throttler: shared.throttler.as_ref(),
    };

    while let Some(task) = shared.pending.pop() {
        if let Err(e) = task(&mut ctx) {
            log::warn!("[{}] pending registration failed: {}", shared.name, e);
        }
    }
}

fn dispatch(channels: &mut HashMap<Token, ChannelIo>, shared: &Shared, event: ReadyEvent) {
    if event.readable || event.writable {
        let flow = match channels.get_mut(&event.token) {
            Some(io) => pump(io, shared),
            None => return,
        };
        if flow == Flow::Closed {
            close_early_and_quietly(channels, shared, event.token);
        }
    }
}

/// Drive one channel: drain the output backlog, then read, dispatch frames,
/// and flush until the socket or the buffers stop making progress.
fn pump(io: &mut ChannelIo, shared: &Shared) -> Flow {
    if flush_output(io, shared) == Flow::Closed {
        return Flow::Closed;
    }

    loop {
        let mut drained_socket = false;
        loop {
            if io.input.spare_capacity() == 0 {
                break;
            }
            match io.channel.read_into(&mut io.input) {
                Ok(0) => return Flow::Closed,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    drained_socket = true;
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::debug!("[{}] read failed: {}", shared.name, e);
                    return Flow::Closed;
                }
            }
        }

        let before = io.input.remaining();
        io.dispatcher.process(&mut io.input, &mut io.output, io.handler.as_mut());
        io.input.compact();

        if flush_output(io, shared) == Flow::Closed {
            return Flow::Closed;
        }

        // Stop once the socket is dry, or when backpressure blocks frame
        // progress; the pending writable event resumes the pump.
        if drained_socket || io.input.remaining() == before {
            return Flow::Continue;
        }
    }
}

/// Flush `[out_sent, position)` of the output buffer to the socket.
/// Write interest is re-checked before every write so a throttled channel
/// stops immediately.
fn flush_output(io: &mut ChannelIo, shared: &Shared) -> Flow {
    while io.out_sent < io.output.position() {
        if !io.channel.write_interest() {
            break;
        }
        match io.channel.write_from(io.output.slice(io.out_sent, io.output.position())) {
            Ok(0) => return Flow::Closed,
            Ok(n) => {
                io.out_sent += n;
                if let Some(throttler) = shared.throttler.as_ref() {
                    throttler.contemplate_throttle_writes(n);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                log::debug!("[{}] write failed: {}", shared.name, e);
                return Flow::Closed;
            }
        }
    }

    if io.out_sent == io.output.position() {
        io.out_sent = 0;
        io.output.set_position(0);
    }
    Flow::Continue
}

/// Tear one channel down after a fatal per-channel condition: notify the
/// callback, detach from the throttler, close the channel quietly.
fn close_early_and_quietly(
    channels: &mut HashMap<Token, ChannelIo>,
    shared: &Shared,
    token: Token,
) {
    let Some(mut io) = channels.remove(&token) else {
        return;
    };

    if let Some(callback) = io.callback.as_mut() {
        callback.on_event(None, None, EventType::Closed);
    }
    if let Some(throttler) = shared.throttler.as_ref() {
        throttler.remove(io.channel.channel_id());
    }
    if let Err(e) = io.channel.close() {
        log::debug!("[{}] channel close failed: {}", shared.name, e);
    }
    log::debug!("[{}] closed channel {:?}", shared.name, token);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_twice_is_rejected() {
        let reactor = Reactor::new("twice", ReactorConfig::default()).unwrap();
        reactor.start().unwrap();
        assert!(reactor.start().is_err());
        reactor.close();
    }

    #[test]
    fn close_is_idempotent_and_joins_the_thread() {
        let reactor = Reactor::new("close-twice", ReactorConfig::default()).unwrap();
        reactor.start().unwrap();

        reactor.close();
        assert!(reactor.is_closed());
        assert!(reactor.closeables().is_closed());
        reactor.close();
    }

    #[test]
    fn close_without_start_is_safe() {
        let reactor = Reactor::new("never-started", ReactorConfig::default()).unwrap();
        reactor.close();
        assert!(reactor.is_closed());
    }

    #[test]
    fn registrations_are_rejected_after_close() {
        let reactor = Reactor::new("closed-regs", ReactorConfig::default()).unwrap();
        reactor.start().unwrap();
        reactor.close();

        let result =
            reactor.add_pending_registration(Box::new(|_: &mut ReactorContext<'_>| Ok(())));
        assert_eq!(result, Err(AlreadyClosed));
    }

    #[test]
    fn pending_tasks_run_on_the_reactor_thread_in_order() {
        use std::sync::atomic::AtomicUsize;

        let reactor = Reactor::new("ordered-regs", ReactorConfig::default()).unwrap();
        reactor.start().unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(AtomicUsize::new(0));

        for i in 0..4 {
            let order = order.clone();
            let failures = failures.clone();
            reactor
                .add_pending_registration(Box::new(move |_: &mut ReactorContext<'_>| {
                    order.lock().push(i);
                    if i == 1 {
                        failures.fetch_add(1, Ordering::SeqCst);
                        return Err(io::Error::other("task failure"));
                    }
                    Ok(())
                }))
                .unwrap();
        }

        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        while order.lock().len() < 4 && Instant::now() < deadline {
            thread::sleep(std::time::Duration::from_millis(10));
        }

        // A failing task does not stop the drain.
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        reactor.close();
    }
}
