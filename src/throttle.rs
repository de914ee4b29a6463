// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 wirenet contributors

//! Write-bandwidth throttling.
//!
//! Throttling caps outbound throughput by periodically dropping write
//! interest on tracked channels during periods of high volume. The budget is
//! expressed as bits per day and applied per bucket interval: once the bytes
//! written in the current interval exceed the budget, every tracked channel
//! loses write interest until the interval rolls over.
//!
//! `check_throttle_interval` must run every reactor tick, active or idle, so
//! intervals reset promptly. The tracked set tolerates concurrent
//! add/remove/iterate: the reactor thread mutates it during dispatch while a
//! teardown-initiating thread may remove channels at the same time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::channel::WriteInterest;

pub const BITS_IN_A_BYTE: u64 = 8;

const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

// ============================================================================
// Configuration
// ============================================================================

/// Throttle configuration for a reactor instance.
///
/// A zero rate disables throttling entirely: no throttler is constructed
/// and write interest is never touched.
#[derive(Clone, Debug)]
pub struct ThrottlingConfig {
    /// Outbound budget in bits per day; zero disables throttling
    pub bits_per_day: u64,

    /// Length of one accounting bucket
    pub bucket_interval: Duration,
}

impl ThrottlingConfig {
    pub fn disabled() -> Self {
        Self { bits_per_day: 0, bucket_interval: Duration::from_millis(100) }
    }

    pub fn is_enabled(&self) -> bool {
        self.bits_per_day > 0
    }
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

// ============================================================================
// Throttler
// ============================================================================

/// Byte accounting for the current bucket interval. Touched only on the
/// reactor thread; the mutex exists so the throttler can be shared.
struct Window {
    last_reset: Instant,
    bytes_written: u64,
}

/// Caps write throughput by toggling write interest on tracked channels.
pub struct Throttler {
    /// Tracked channels, keyed by [`WriteInterest::key`]
    channels: DashMap<usize, Arc<dyn WriteInterest>>,

    interval: Duration,

    /// Byte budget per interval, rounded from the bits-per-day rate
    max_bytes_per_interval: u64,

    window: Mutex<Window>,
}

impl Throttler {
    pub fn new(config: &ThrottlingConfig) -> Self {
        let interval_ms = config.bucket_interval.as_millis() as u64;
        let bytes_per_ms =
            config.bits_per_day as f64 / BITS_IN_A_BYTE as f64 / MILLIS_PER_DAY as f64;
        let max_bytes_per_interval = (bytes_per_ms * interval_ms as f64).round() as u64;

        Self {
            channels: DashMap::new(),
            interval: config.bucket_interval,
            max_bytes_per_interval,
            window: Mutex::new(Window { last_reset: Instant::now(), bytes_written: 0 }),
        }
    }

    /// Track a channel. Its write interest becomes subject to throttling.
    pub fn add(&self, channel: Arc<dyn WriteInterest>) {
        self.channels.insert(channel.key(), channel);
    }

    /// Stop tracking a channel by its key.
    pub fn remove(&self, key: usize) {
        self.channels.remove(&key);
    }

    pub fn tracked(&self) -> usize {
        self.channels.len()
    }

    /// Byte budget per bucket interval.
    pub fn max_bytes_per_interval(&self) -> u64 {
        self.max_bytes_per_interval
    }

    /// Bytes accounted against the current interval.
    pub fn bytes_in_interval(&self) -> u64 {
        self.window.lock().bytes_written
    }

    /// Roll the interval over if it has elapsed, restoring write interest on
    /// every tracked channel. No-op while the interval is still running.
    /// Called every reactor tick regardless of activity.
    pub fn check_throttle_interval(&self) {
        {
            let mut window = self.window.lock();
            if window.last_reset.elapsed() < self.interval {
                return;
            }
            window.last_reset = Instant::now();
            window.bytes_written = 0;
        }

        log::debug!("restoring write interest on all throttled channels");
        for entry in self.channels.iter() {
            if let Err(e) = entry.value().set_write_interest(true) {
                log::debug!("restore write interest failed: {}", e);
            }
        }
    }

    /// Account `bytes_just_written` against the interval budget; when the
    /// budget is exceeded, drop write interest on every tracked channel
    /// uniformly until the next interval rollover.
    pub fn contemplate_throttle_writes(&self, bytes_just_written: usize) {
        let over_budget = {
            let mut window = self.window.lock();
            window.bytes_written += bytes_just_written as u64;
            window.bytes_written > self.max_bytes_per_interval
        };

        if over_budget {
            log::debug!("throttling writes");
            for entry in self.channels.iter() {
                if let Err(e) = entry.value().set_write_interest(false) {
                    log::debug!("drop write interest failed: {}", e);
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
