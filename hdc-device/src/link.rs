//! The link adapter seam: what the core requires from the byte transport.
//!
//! The runtime drives a [`Link`] (a UART-like, ordered byte stream) and
//! receives its completion signals through a shared [`LinkPort`]. The
//! port is created by the core and attached to the link exactly once;
//! the link's RX/TX completion handlers only touch the port's atomic
//! flags and RX buffer — they never call back into protocol logic.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::BytesMut;

use crate::error::LinkError;

pub mod loopback;

// ── Link ─────────────────────────────────────────────────────────

/// Capability set the core requires from a byte-stream transport.
///
/// Implementations signal completions through the [`LinkPort`] handed
/// to [`attach`](Link::attach): a finished RX burst via
/// [`LinkPort::rx_event`], a drained transmit via
/// [`LinkPort::complete_tx`].
pub trait Link {
    /// Register the completion port. Called once, before any other
    /// operation.
    fn attach(&mut self, port: std::sync::Arc<LinkPort>);

    /// Begin receiving into the port's RX buffer. The link reports
    /// bursts (buffer full *or* line idle) via [`LinkPort::rx_event`].
    fn start_rx(&mut self) -> Result<(), LinkError>;

    /// Cancel an in-flight reception.
    fn abort_rx(&mut self);

    /// Begin transmitting `frame`. The bytes are handed over to the
    /// link before this returns; completion is signalled via
    /// [`LinkPort::complete_tx`].
    fn start_tx(&mut self, frame: &[u8]) -> Result<(), LinkError>;

    /// Monotonic millisecond clock, used for the flush timeout.
    fn now_ms(&self) -> u64;
}

// ── LinkPort ─────────────────────────────────────────────────────

/// Completion flags and RX window shared between the core and the
/// link's interrupt-time handlers.
///
/// Handlers must only call [`rx_event`](Self::rx_event) and
/// [`complete_tx`](Self::complete_tx); everything else belongs to the
/// core.
pub struct LinkPort {
    rx: Mutex<BytesMut>,
    rx_capacity: usize,
    rx_complete: AtomicBool,
    tx_complete: AtomicBool,
}

impl LinkPort {
    pub(crate) fn new(rx_capacity: usize) -> Self {
        Self {
            rx: Mutex::new(BytesMut::with_capacity(rx_capacity)),
            rx_capacity,
            rx_complete: AtomicBool::new(false),
            // No transmit is outstanding at start-up.
            tx_complete: AtomicBool::new(true),
        }
    }

    // ── Adapter side ─────────────────────────────────────────────

    /// Deliver a burst of received bytes.
    ///
    /// Bursts accumulate in the RX window until the core re-arms
    /// reception; bytes beyond the window's capacity are dropped (an
    /// unruly host oversending scrambles only its own request, which
    /// the framer then reports as framing errors).
    pub fn rx_event(&self, burst: &[u8]) {
        {
            let mut rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
            let room = self.rx_capacity - rx.len();
            rx.extend_from_slice(&burst[..burst.len().min(room)]);
        }
        self.rx_complete.store(true, Ordering::SeqCst);
    }

    /// Signal that the outstanding transmit has drained.
    pub fn complete_tx(&self) {
        self.tx_complete.store(true, Ordering::SeqCst);
    }

    // ── Core side ────────────────────────────────────────────────

    pub(crate) fn rx_ready(&self) -> bool {
        self.rx_complete.load(Ordering::SeqCst)
    }

    pub(crate) fn tx_idle(&self) -> bool {
        self.tx_complete.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_tx(&self) {
        self.tx_complete.store(false, Ordering::SeqCst);
    }

    /// Reset the RX window before re-arming reception at offset zero.
    pub(crate) fn rearm_rx(&self) {
        let mut rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        rx.clear();
        self.rx_complete.store(false, Ordering::SeqCst);
    }

    /// Run `f` over the current RX window contents.
    pub(crate) fn with_rx<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
        f(&rx)
    }
}

// ── Tests ────────────────────────────────────────────────────────
