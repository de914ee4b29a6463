// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 wirenet contributors

//! Reactor configuration.

use std::time::Duration;

use crate::throttle::ThrottlingConfig;
use crate::wire::FrameLimits;

/// Configuration for one reactor instance.
#[derive(Clone, Debug)]
pub struct ReactorConfig {
    /// Upper bound on each blocking readiness wait
    pub poll_timeout: Duration,

    /// Capacity of the poller's event batch per cycle
    pub events_capacity: usize,

    /// Collect poll results in the double-buffered ready set instead of
    /// walking the poller's own event list. Both paths behave identically;
    /// the ready set avoids per-poll allocation in the dispatch loop.
    pub ready_set: bool,

    /// Per-channel input buffer size; must hold at least one maximum-size
    /// frame
    pub input_buffer_size: usize,

    /// Per-channel output buffer size
    pub output_buffer_size: usize,

    /// How many times `close` re-checks for reactor thread exit
    pub join_retries: u32,

    /// Wait per close retry; each expiry emits a diagnostic dump
    pub join_retry_interval: Duration,

    /// Write-bandwidth throttle; disabled at rate zero
    pub throttling: ThrottlingConfig,

    /// Reply/publish body-size bounds for frame dispatch
    pub frame_limits: FrameLimits,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
            events_capacity: 128,
            ready_set: true,
            input_buffer_size: 128 * 1024,
            output_buffer_size: 128 * 1024,
            join_retries: 10,
            join_retry_interval: Duration::from_secs(1),
            throttling: ThrottlingConfig::disabled(),
            frame_limits: FrameLimits::default(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{FRAME_HEADER_SIZE, MAX_FRAME_BODY};

    #[test]
    fn default_buffers_hold_a_maximum_frame() {
        let config = ReactorConfig::default();
        assert!(config.input_buffer_size >= FRAME_HEADER_SIZE + MAX_FRAME_BODY);
        assert!(config.output_buffer_size >= FRAME_HEADER_SIZE + MAX_FRAME_BODY);
    }

    #[test]
    fn throttling_is_off_by_default() {
        assert!(!ReactorConfig::default().throttling.is_enabled());
    }
}
