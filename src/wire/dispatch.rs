// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 wirenet contributors

//! Length-prefix frame dispatch over an I/O buffer pair.
//!
//! TCP is a stream protocol without message boundaries. The
//! [`FrameDispatcher`] consumes one input buffer and fills one output buffer
//! per invocation, decoding length-prefixed frames and invoking a
//! [`FrameHandler`] hook with wire views clamped to exactly one frame's
//! body:
//!
//! ```text
//! +----------------+------------------+----------------+-----------------+
//! | Length (2B BE) | Body             | Length (2B BE) | Body            |
//! +----------------+------------------+----------------+-----------------+
//! ```
//!
//! Replies are built in place: a 2-byte placeholder is reserved before the
//! hook runs and back-patched with the observed body length afterwards. An
//! empty reply is suppressed entirely and ends the batch - the remaining
//! input is picked up on the next invocation.
//!
//! # Batching and backpressure
//!
//! Multiple frames packed in one input buffer are processed in a single
//! invocation, but only while the output buffer keeps more than half its
//! capacity free. The valve bounds the worst-case batch relative to buffer
//! size and leaves headroom for the caller's flush cycle.
//!
//! # Window clamp
//!
//! For each frame the input window is narrowed to the frame body before the
//! hook runs and restored on every exit path; the cursor is force-advanced
//! to the frame boundary regardless of how much the hook consumed. A hook
//! that under- or over-reads therefore corrupts nothing but its own frame.

use super::buffer::IoBuffer;
use super::view::{WireError, WireIn, WireOut};

/// Frame header size (2 bytes for the body length).
pub const FRAME_HEADER_SIZE: usize = 2;

/// Largest body a frame header can describe.
pub const MAX_FRAME_BODY: usize = u16::MAX as usize;

// ============================================================================
// Limits
// ============================================================================

/// Body-size bounds enforced when back-patching reply headers.
///
/// The two defaults differ on purpose: unsolicited publishes may use the
/// full 65535-byte header range while per-frame replies are bounded at 1024
/// bytes, mirroring long-standing observed behavior. Deployments that need
/// symmetric bounds should set both fields explicitly rather than assume
/// they match.
#[derive(Clone, Debug)]
pub struct FrameLimits {
    /// Bound on bodies emitted by the `publish` hook
    pub max_publish_body: usize,

    /// Bound on bodies emitted by the per-frame hook
    pub max_reply_body: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self { max_publish_body: MAX_FRAME_BODY, max_reply_body: 1024 }
    }
}

// ============================================================================
// Handler hook
// ============================================================================

/// Per-frame processing hook.
///
/// `on_frame` receives views over exactly one inbound frame's body and the
/// output stream; whatever it writes becomes the reply body. `publish` runs
/// when an invocation has no complete header to read and may emit one
/// unsolicited frame.
pub trait FrameHandler: Send {
    fn on_frame(
        &mut self,
        input: &mut WireIn<'_>,
        output: &mut WireOut<'_>,
    ) -> Result<(), WireError>;

    /// Emit out-of-band output when no inbound frame triggered processing.
    fn publish(&mut self, _output: &mut WireOut<'_>) -> Result<(), WireError> {
        Ok(())
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Frame decode/encode state machine over one buffer pair.
///
/// The dispatcher itself is buffer-agnostic: callers may hand it a different
/// (pooled) buffer on any invocation. View bindings track the buffer
/// identities seen last and are rebuilt when they change, when absent, or
/// when [`FrameDispatcher::request_view_rebuild`] was called.
#[derive(Debug)]
pub struct FrameDispatcher {
    limits: FrameLimits,

    /// Identity of the input buffer the reader view is bound to
    in_binding: Option<u64>,

    /// Identity of the output buffer the writer view is bound to
    out_binding: Option<u64>,

    /// Forces both views to rebuild on the next invocation
    rebuild_requested: bool,

    /// Statistics: view rebinds performed
    view_rebuilds: u64,

    /// Statistics: inbound frames consumed
    frames_consumed: u64,

    /// Statistics: reply/publish frames emitted
    frames_emitted: u64,
}

impl FrameDispatcher {
    pub fn new(limits: FrameLimits) -> Self {
        Self {
            limits,
            in_binding: None,
            out_binding: None,
            rebuild_requested: false,
            view_rebuilds: 0,
            frames_consumed: 0,
            frames_emitted: 0,
        }
    }

    pub fn with_default_limits() -> Self {
        Self::new(FrameLimits::default())
    }

    /// Force the views to rebuild on the next invocation.
    pub fn request_view_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    /// Number of view rebinds performed so far.
    pub fn view_rebuilds(&self) -> u64 {
        self.view_rebuilds
    }

    /// Number of inbound frames consumed so far.
    pub fn frames_consumed(&self) -> u64 {
        self.frames_consumed
    }

    /// Number of reply/publish frames emitted so far.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    fn bind_views(&mut self, input: &IoBuffer, output: &IoBuffer) {
        let force = self.rebuild_requested;
        self.rebuild_requested = false;

        if force || self.in_binding != Some(input.id()) {
            self.in_binding = Some(input.id());
            self.view_rebuilds += 1;
        }
        if force || self.out_binding != Some(output.id()) {
            self.out_binding = Some(output.id());
            self.view_rebuilds += 1;
        }
    }

    /// Run one invocation of the dispatch state machine.
    ///
    /// Input convention: `[position, limit)` holds unread stream bytes.
    /// Output convention: `position` is the write cursor, `limit` the
    /// capacity. Frames without their full body buffered yet are left
    /// untouched for a later invocation.
    pub fn process(
        &mut self,
        input: &mut IoBuffer,
        output: &mut IoBuffer,
        handler: &mut dyn FrameHandler,
    ) {
        self.bind_views(input, output);

        if input.remaining() < FRAME_HEADER_SIZE {
            self.publish_once(output, handler);
            return;
        }

        loop {
            let length = usize::from(input.peek_u16(input.position()));
            if input.remaining() < length + FRAME_HEADER_SIZE {
                // Wait for the rest of this frame to arrive.
                return;
            }
            if output.remaining() < FRAME_HEADER_SIZE {
                return;
            }

            input.skip(FRAME_HEADER_SIZE);
            let saved_limit = input.limit();
            let frame_end = input.position() + length;
            let reply_at = output.position();

            input.set_limit(frame_end);
            output.skip(FRAME_HEADER_SIZE);

            let outcome =
                handler.on_frame(&mut WireIn::new(input), &mut WireOut::new(output));

            // Restored regardless of what the hook consumed or returned.
            input.set_limit(saved_limit);
            input.set_position(frame_end);
            self.frames_consumed += 1;

            match outcome {
                Ok(()) => {
                    let written = output.position() - reply_at - FRAME_HEADER_SIZE;
                    if written == 0 {
                        // An empty reply suppresses the frame and ends the
                        // batch; queued input waits for the next invocation.
                        output.set_position(reply_at);
                        return;
                    }
                    if written > self.limits.max_reply_body {
                        debug_assert!(
                            written <= self.limits.max_reply_body,
                            "reply body of {} bytes exceeds bound {}",
                            written,
                            self.limits.max_reply_body
                        );
                        log::error!(
                            "dropping oversized reply: {} bytes (bound {})",
                            written,
                            self.limits.max_reply_body
                        );
                        output.set_position(reply_at);
                        return;
                    }
                    output.put_u16(reply_at, written as u16);
                    self.frames_emitted += 1;
                }
                Err(e) => {
                    log::warn!("frame handler failed, dropping frame: {}", e);
                    output.set_position(reply_at);
                }
            }

            if input.remaining() < FRAME_HEADER_SIZE
                || output.remaining() <= output.capacity() / 2
            {
                return;
            }
        }
    }

    /// Give the handler one chance to emit unsolicited output.
    fn publish_once(&mut self, output: &mut IoBuffer, handler: &mut dyn FrameHandler) {
        if output.remaining() < FRAME_HEADER_SIZE {
            return;
        }
        let reply_at = output.position();
        output.skip(FRAME_HEADER_SIZE);

        if let Err(e) = handler.publish(&mut WireOut::new(output)) {
            log::warn!("publish hook failed: {}", e);
            output.set_position(reply_at);
            return;
        }

        let written = output.position() - reply_at - FRAME_HEADER_SIZE;
        if written == 0 {
            output.set_position(reply_at);
            return;
        }
        if written > self.limits.max_publish_body {
            debug_assert!(
                written <= self.limits.max_publish_body,
                "publish body of {} bytes exceeds bound {}",
                written,
                self.limits.max_publish_body
            );
            log::error!(
                "dropping oversized publish: {} bytes (bound {})",
                written,
                self.limits.max_publish_body
            );
            output.set_position(reply_at);
            return;
        }
        output.put_u16(reply_at, written as u16);
        self.frames_emitted += 1;
    }
}

// ============================================================================
// Frame helpers
// ============================================================================

/// Append one `[length][body]` frame at the buffer's cursor.
pub fn encode_frame(body: &[u8], out: &mut IoBuffer) {
    assert!(body.len() <= MAX_FRAME_BODY, "frame body of {} bytes", body.len());
    out.write_bytes(&(body.len() as u16).to_be_bytes());
    out.write_bytes(body);
}

/// Body length of the frame at the cursor, if its header is buffered.
pub fn peek_frame(buf: &IoBuffer) -> Option<usize> {
    if buf.remaining() < FRAME_HEADER_SIZE {
        return None;
    }
    Some(usize::from(buf.peek_u16(buf.position())))
}

// ============================================================================
// Tests
// ============================================================================
