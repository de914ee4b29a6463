// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 wirenet contributors

//! # wirenet - selector-driven TCP reactor with wire framing
//!
//! A small core for building low-latency TCP servers and clients around a
//! single-threaded, poll-driven event loop. Each reactor instance owns one
//! polling handle and one dedicated thread; message framing, write
//! throttling, and reconnection are composed on top of it.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                          Reactor                             |
//! |  +--------------------------------------------------------+  |
//! |  |                      mio::Poll                         |  |
//! |  |  - registered channels (read/write readiness)          |  |
//! |  |  - Waker (cross-thread registration handoff)           |  |
//! |  +--------------------------------------------------------+  |
//! |        |                    |                    |           |
//! |        v                    v                    v           |
//! |  +-----------+      +-------------+      +-------------+    |
//! |  | drain     |      |  dispatch   |      |  throttle   |    |
//! |  | pending   |      |  frames     |      |  check      |    |
//! |  +-----------+      +------+------+      +-------------+    |
//! |                            |                                 |
//! |                            v                                 |
//! |  +--------------------------------------------------------+  |
//! |  |   FrameDispatcher -> FrameHandler hook -> replies      |  |
//! |  +--------------------------------------------------------+  |
//! +--------------------------------------------------------------+
//!
//!   Connector threads ---> CloseableRegistry ---> pending registration
//! ```
//!
//! ## Wire format
//!
//! Every message is a length-prefixed frame packed contiguously in the
//! stream:
//!
//! ```text
//! +----------------+----------------------+
//! | Length (2B BE) | Body (Length bytes)  |
//! +----------------+----------------------+
//! ```
//!
//! The length field covers the body only and is bounded at 65535.
//!
//! ## Modules
//!
//! - [`reactor`] - the event loop core: thread lifecycle, registration
//!   handoff, close handshake
//! - [`channel`] - channel handle, write-interest toggling, callback sink
//! - [`connector`] - reconnect-with-backoff for one logical outbound link
//! - [`throttle`] - write-bandwidth throttling via write-interest toggling
//! - [`registry`] - best-effort collector of resources closed at teardown
//! - [`ready_set`] - double-buffered readiness event collection
//! - [`wire`] - I/O buffers, frame dispatch state machine, wire views
//!
//! ## Concurrency model
//!
//! All polling, dispatch, and throttle bookkeeping happen on the reactor
//! thread. The only cross-thread state is the pending-registration queue,
//! the closed flag, the throttler's tracked-channel set, and the channel
//! handles themselves. `Reactor::close` blocks (bounded) until the reactor
//! thread has exited before returning; tearing down state the thread might
//! still touch is not tolerated.

pub mod channel;
pub mod config;
pub mod connector;
pub mod reactor;
pub mod ready_set;
pub mod registry;
pub mod throttle;
pub mod wire;

pub use channel::{Channel, ChannelCallback, EventType, WriteInterest};
pub use config::ReactorConfig;
pub use connector::Connector;
pub use reactor::{Reactor, ReactorContext, Registration};
pub use ready_set::{ReadyEvent, ReadySet};
pub use registry::{AlreadyClosed, Closeable, CloseableRegistry};
pub use throttle::{Throttler, ThrottlingConfig};
pub use wire::{
    FrameDispatcher, FrameHandler, FrameLimits, IoBuffer, WireError, WireIn, WireOut,
    FRAME_HEADER_SIZE, MAX_FRAME_BODY,
};
