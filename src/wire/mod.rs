// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 wirenet contributors

//! Wire layer: I/O buffers, frame dispatch, and structured views.
//!
//! - `buffer` - reusable cursor-based byte buffers
//! - `dispatch` - the length-prefix frame state machine and handler hook
//! - `view` - structured field reader/writer pair handed to handlers

pub mod buffer;
pub mod dispatch;
pub mod view;

pub use buffer::IoBuffer;
pub use dispatch::{
    encode_frame, peek_frame, FrameDispatcher, FrameHandler, FrameLimits, FRAME_HEADER_SIZE,
    MAX_FRAME_BODY,
};
pub use view::{WireError, WireIn, WireOut};
