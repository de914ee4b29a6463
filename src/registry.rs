// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 wirenet contributors

//! Best-effort registry of resources closed together at teardown.
//!
//! Every resource opened on behalf of a reactor instance is registered here
//! and closed when the instance shuts down. Closing is quiet: individual
//! failures are logged and the sweep continues. Registration after shutdown
//! fails with [`AlreadyClosed`] - connector threads racing a teardown hit
//! this and must treat it as benign.

use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

/// A resource the registry can close.
pub trait Closeable: Send + Sync {
    fn close(&self) -> io::Result<()>;
}

/// Returned by [`CloseableRegistry::register`] once the registry has been
/// shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyClosed;

impl fmt::Display for AlreadyClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry already shut down")
    }
}

impl std::error::Error for AlreadyClosed {}

/// Collects resources and closes them all, best-effort, at teardown.
pub struct CloseableRegistry {
    /// `None` once `close_all` has run
    resources: Mutex<Option<Vec<Arc<dyn Closeable>>>>,
}

impl CloseableRegistry {
    pub fn new() -> Self {
        Self { resources: Mutex::new(Some(Vec::new())) }
    }

    /// Register a resource for teardown.
    pub fn register(&self, resource: Arc<dyn Closeable>) -> Result<(), AlreadyClosed> {
        match self.resources.lock().as_mut() {
            Some(resources) => {
                resources.push(resource);
                Ok(())
            }
            None => Err(AlreadyClosed),
        }
    }

    /// Close every registered resource, continuing past individual failures.
    /// Idempotent; later `register` calls fail with [`AlreadyClosed`].
    pub fn close_all(&self) {
        let Some(resources) = self.resources.lock().take() else {
            return;
        };
        for resource in resources {
            if let Err(e) = resource.close() {
                log::debug!("resource close failed: {}", e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.resources.lock().is_none()
    }

    /// Number of currently registered resources; zero after shutdown.
    pub fn len(&self) -> usize {
        self.resources.lock().as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CloseableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Closeable for Probe {
        fn close(&self) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(io::Error::other("close failed"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn close_all_closes_everything_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = CloseableRegistry::new();
        for _ in 0..3 {
            registry
                .register(Arc::new(Probe { closes: closes.clone(), fail: false }))
                .unwrap();
        }
        assert_eq!(registry.len(), 3);

        registry.close_all();
        assert_eq!(closes.load(Ordering::SeqCst), 3);
        assert!(registry.is_closed());
        assert_eq!(registry.len(), 0);

        // Idempotent.
        registry.close_all();
        assert_eq!(closes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn close_all_continues_past_failures() {
        let closes = Arc::new(AtomicUsize::new(0));
        let registry = CloseableRegistry::new();
        registry.register(Arc::new(Probe { closes: closes.clone(), fail: true })).unwrap();
        registry.register(Arc::new(Probe { closes: closes.clone(), fail: false })).unwrap();

        registry.close_all();
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn register_after_close_is_rejected() {
        let registry = CloseableRegistry::new();
        registry.close_all();

        let closes = Arc::new(AtomicUsize::new(0));
        let result = registry.register(Arc::new(Probe { closes, fail: false }));
        assert_eq!(result, Err(AlreadyClosed));
    }
}
