//! In-memory link for tests and host-less bring-up.
//!
//! The loopback completes every transmit synchronously and records the
//! raw wire bytes for inspection. Cloning yields another handle onto
//! the same link, so a test can keep a probe while the device owns the
//! adapter.

use std::sync::{Arc, Mutex, OnceLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::error::LinkError;
use crate::link::{Link, LinkPort};

/// A link whose far end is the test itself.
#[derive(Clone)]
pub struct LoopbackLink {
    inner: Arc<Inner>,
}

struct Inner {
    port: OnceLock<Arc<LinkPort>>,
    wire_out: Mutex<Vec<u8>>,
    armed: AtomicBool,
    stalled: AtomicBool,
    epoch: Instant,
}

impl LoopbackLink {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                port: OnceLock::new(),
                wire_out: Mutex::new(Vec::new()),
                armed: AtomicBool::new(false),
                stalled: AtomicBool::new(false),
                epoch: Instant::now(),
            }),
        }
    }

    /// Push bytes towards the device, as a host writing to the wire.
    ///
    /// Bytes sent while reception is not armed are lost, matching an
    /// aborted UART reception.
    pub fn inject(&self, bytes: &[u8]) {
        if !self.inner.armed.load(Ordering::SeqCst) {
            return;
        }
        if let Some(port) = self.inner.port.get() {
            port.rx_event(bytes);
        }
    }

    /// Everything the device has transmitted so far.
    pub fn transmitted(&self) -> Vec<u8> {
        self.inner
            .wire_out
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Drain and return the transmitted bytes.
    pub fn take_transmitted(&self) -> Vec<u8> {
        std::mem::take(
            &mut self
                .inner
                .wire_out
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        )
    }

    /// When stalled, transmits are accepted but never complete. Used to
    /// exercise the flush timeout.
    pub fn set_tx_stalled(&self, stalled: bool) {
        self.inner.stalled.store(stalled, Ordering::SeqCst);
    }
}

impl Default for LoopbackLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Link for LoopbackLink {
    fn attach(&mut self, port: Arc<LinkPort>) {
        let _ = self.inner.port.set(port);
    }

    fn start_rx(&mut self) -> Result<(), LinkError> {
        if self.inner.port.get().is_none() {
            return Err(LinkError::Detached);
        }
        self.inner.armed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn abort_rx(&mut self) {
        self.inner.armed.store(false, Ordering::SeqCst);
    }

    fn start_tx(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        let port = self.inner.port.get().ok_or(LinkError::Detached)?;
        self.inner
            .wire_out
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(frame);
        if !self.inner.stalled.load(Ordering::SeqCst) {
            port.complete_tx();
        }
        Ok(())
    }

    fn now_ms(&self) -> u64 {
        self.inner.epoch.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_link_rejects_operations() {
        let mut link = LoopbackLink::new();
        assert!(matches!(link.start_rx(), Err(LinkError::Detached)));
        assert!(matches!(link.start_tx(&[1]), Err(LinkError::Detached)));
    }

    #[test]
    fn injection_requires_armed_reception() {
        let mut link = LoopbackLink::new();
        let port = Arc::new(LinkPort::new(8));
        link.attach(port.clone());

        link.inject(&[1, 2, 3]);
        assert!(!port.rx_ready());

        link.start_rx().unwrap();
        link.inject(&[1, 2, 3]);
        assert!(port.rx_ready());
        port.with_rx(|window| assert_eq!(window, &[1, 2, 3]));
    }

    #[test]
    fn transmit_completes_synchronously() {
        let mut link = LoopbackLink::new();
        let probe = link.clone();
        let port = Arc::new(LinkPort::new(8));
        link.attach(port.clone());

        port.begin_tx();
        link.start_tx(&[0xAA, 0xBB]).unwrap();
        assert!(port.tx_idle());
        assert_eq!(probe.take_transmitted(), vec![0xAA, 0xBB]);
    }

    #[test]
    fn stalled_transmit_never_completes() {
        let mut link = LoopbackLink::new();
        let port = Arc::new(LinkPort::new(8));
        link.attach(port.clone());
        link.set_tx_stalled(true);

        port.begin_tx();
        link.start_tx(&[0xAA]).unwrap();
        assert!(!port.tx_idle());
    }
}
