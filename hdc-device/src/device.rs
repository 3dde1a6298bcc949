//! The core orchestrator: owns the link, the descriptor registry and
//! both sides of the buffering, and drives one request at a time from
//! the application's main loop.

use std::sync::Arc;

use crate::compose::{Composer, TxHalf};
use crate::ctx::{Ctx, MessageRouter};
use crate::descriptor::Feature;
use crate::dispatch;
use crate::error::HdcError;
use crate::event::{self, LogLevel};
use crate::frame::{self, MAX_PACKET_PAYLOAD, PACKET_OVERHEAD};
use crate::link::{Link, LinkPort};
use crate::registry::FeatureRegistry;

/// The HDC device runtime.
///
/// `MAX_REQ` is the largest request message the device accepts
/// (`5..=254`); `TX_CAP` is the size of each of the two TX buffers
/// (`258..=65535`, large enough for one full packet). Both are checked
/// at build time.
///
/// The application calls [`work`](Self::work) from its main loop; the
/// link invokes [`LinkPort::rx_event`] and [`LinkPort::complete_tx`]
/// from its completion handlers. Exactly one request is in flight at a
/// time — the host contract the single RX buffer relies on.
pub struct Device<L: Link, const MAX_REQ: usize = 128, const TX_CAP: usize = 258> {
    link: L,
    port: Arc<LinkPort>,
    composer: Composer,
    registry: FeatureRegistry,
    router: Option<MessageRouter>,
}

impl<L: Link, const MAX_REQ: usize, const TX_CAP: usize> Device<L, MAX_REQ, TX_CAP> {
    const CONFIG_OK: () = {
        assert!(
            MAX_REQ >= 5 && MAX_REQ <= 254,
            "MAX_REQ must be within 5..=254"
        );
        assert!(
            TX_CAP >= MAX_PACKET_PAYLOAD + PACKET_OVERHEAD && TX_CAP <= u16::MAX as usize,
            "TX_CAP must be within 258..=65535"
        );
    };

    /// Validate the descriptors, attach the completion port and start
    /// receiving.
    pub fn new(link: L, features: Vec<Feature>) -> Result<Self, HdcError> {
        Self::build(link, features, None)
    }

    /// Like [`new`](Self::new), with a fallback router for message
    /// types below the protocol-reserved range.
    pub fn with_message_router(
        link: L,
        features: Vec<Feature>,
        router: MessageRouter,
    ) -> Result<Self, HdcError> {
        Self::build(link, features, Some(router))
    }

    fn build(
        mut link: L,
        features: Vec<Feature>,
        router: Option<MessageRouter>,
    ) -> Result<Self, HdcError> {
        let () = Self::CONFIG_OK;

        let registry = FeatureRegistry::new(features)?;
        let port = Arc::new(LinkPort::new(MAX_REQ + PACKET_OVERHEAD));
        link.attach(Arc::clone(&port));
        link.start_rx()?;

        Ok(Self {
            link,
            port,
            composer: Composer::new(TX_CAP),
            registry,
            router,
        })
    }

    fn ctx(&mut self) -> Ctx<'_> {
        let Self {
            link,
            port,
            composer,
            registry,
            ..
        } = self;
        Ctx {
            tx: TxHalf {
                composer,
                link,
                port: &**port,
            },
            registry,
            max_req: MAX_REQ,
        }
    }

    // ── Main loop ────────────────────────────────────────────────

    /// Drive the runtime once: service a completed RX burst, then start
    /// transmitting anything pending once the link is idle.
    pub fn work(&mut self) -> Result<(), HdcError> {
        if self.port.rx_ready() {
            self.process_rx()?;
        }
        if self.port.tx_idle() {
            self.ctx().tx.pump()?;
        }
        Ok(())
    }

    fn process_rx(&mut self) -> Result<(), HdcError> {
        let scan = self.port.with_rx(|window| frame::scan(window, MAX_REQ));

        // The request is copied out of the RX window so reception can
        // restart before the reply is composed.
        let mut request = [0u8; MAX_PACKET_PAYLOAD];
        let mut request_len = 0usize;
        if let Some(range) = scan.payload.clone() {
            self.port.with_rx(|window| {
                let message = &window[range];
                request[..message.len()].copy_from_slice(message);
                request_len = message.len();
            });
        }

        if scan.disturbed() {
            // Rearm reception at buffer offset zero. Safe before the
            // reply goes out: the host must not send again until then.
            self.link.abort_rx();
            self.port.rearm_rx();
            self.link.start_rx()?;
        } else {
            return Ok(());
        }

        let Self {
            link,
            port,
            composer,
            registry,
            router,
        } = self;
        let mut ctx = Ctx {
            tx: TxHalf {
                composer,
                link,
                port: &**port,
            },
            registry,
            max_req: MAX_REQ,
        };

        if scan.payload.is_some() {
            dispatch::process_message(&mut ctx, router, &request[..request_len])?;
        }
        if scan.frame_errors > 0 {
            tracing::warn!(
                count = scan.frame_errors,
                "framing errors while receiving request"
            );
            event::emit_log(
                &mut ctx,
                None,
                LogLevel::Warning,
                "Reading-frame-errors detected while parsing request message on device.",
            )?;
        }
        Ok(())
    }

    /// Transmit anything pending and wait for the link to drain,
    /// bounded by a 100 ms timeout. Returns quietly on timeout so an
    /// error path can never recurse through another flush.
    pub fn flush(&mut self) -> Result<(), HdcError> {
        self.ctx().tx.flush()
    }

    // ── Application-facing API ───────────────────────────────────

    /// Raise a feature event. `feature = None` targets the Core
    /// feature.
    pub fn emit_event(
        &mut self,
        feature: Option<u8>,
        event_id: u8,
        prefix: &[u8],
        suffix: &[u8],
    ) -> Result<(), HdcError> {
        event::emit_event(&mut self.ctx(), feature, event_id, prefix, suffix)
    }

    /// Raise a Log event, subject to the target feature's threshold.
    pub fn emit_log(
        &mut self,
        feature: Option<u8>,
        level: LogLevel,
        text: &str,
    ) -> Result<(), HdcError> {
        event::emit_log(&mut self.ctx(), feature, level, text)
    }

    /// Transition a feature's state machine and notify the host.
    pub fn feature_state_transition(
        &mut self,
        feature: Option<u8>,
        new_state: u8,
    ) -> Result<(), HdcError> {
        event::state_transition(&mut self.ctx(), feature, new_state)
    }

    /// Inspect a registered feature.
    pub fn feature(&self, id: u8) -> Option<&Feature> {
        self.registry.feature(id)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PACKET_TERMINATOR, checksum};
    use crate::link::loopback::LoopbackLink;

    fn core() -> Feature {
        Feature::new(0x00, "Core", "TestCore", "1.0")
    }

    fn packet(payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![payload.len() as u8];
        bytes.extend_from_slice(payload);
        bytes.push(checksum(payload));
        bytes.push(PACKET_TERMINATOR);
        bytes
    }

    #[test]
    fn new_arms_reception() {
        let link = LoopbackLink::new();
        let probe = link.clone();
        let _device: Device<_> = Device::new(link, vec![core()]).unwrap();

        // Reception armed: injected bytes land in the port.
        probe.inject(&[0x00]);
    }

    #[test]
    fn descriptor_errors_surface_from_new() {
        let link = LoopbackLink::new();
        let err = Device::<_>::new(link, Vec::new()).err();
        assert!(matches!(err, Some(HdcError::Descriptor(_))));
    }

    #[test]
    fn echo_request_is_replied_verbatim() {
        let link = LoopbackLink::new();
        let probe = link.clone();
        let mut device: Device<_> = Device::new(link, vec![core()]).unwrap();

        let payload = [0xF1, 0xDE, 0xAD, 0xBE, 0xEF];
        probe.inject(&packet(&payload));
        device.work().unwrap();

        assert_eq!(probe.take_transmitted(), packet(&payload));
    }

    #[test]
    fn empty_request_is_dropped_silently() {
        let link = LoopbackLink::new();
        let probe = link.clone();
        let mut device: Device<_> = Device::new(link, vec![core()]).unwrap();

        probe.inject(&packet(&[]));
        device.work().unwrap();

        assert!(probe.take_transmitted().is_empty());
    }

    #[test]
    fn work_without_traffic_is_a_no_op() {
        let link = LoopbackLink::new();
        let probe = link.clone();
        let mut device: Device<_> = Device::new(link, vec![core()]).unwrap();

        device.work().unwrap();
        device.work().unwrap();
        assert!(probe.take_transmitted().is_empty());
    }

    #[test]
    fn state_transition_reports_prev_and_next() {
        let link = LoopbackLink::new();
        let probe = link.clone();
        let mut device: Device<_> = Device::new(
            link,
            vec![core().with_initial_state(0x01)],
        )
        .unwrap();

        device.feature_state_transition(None, 0x02).unwrap();
        device.flush().unwrap();

        assert_eq!(
            probe.take_transmitted(),
            packet(&[0xF3, 0x00, 0xF1, 0x01, 0x02])
        );
        assert_eq!(device.feature(0x00).unwrap().state(), 0x02);
    }

    #[test]
    fn transition_to_undeclared_state_is_rejected() {
        let link = LoopbackLink::new();
        let mut device: Device<_> = Device::new(
            link,
            vec![
                core()
                    .with_state(crate::descriptor::State::new(0x00, "Off"))
                    .with_state(crate::descriptor::State::new(0x01, "Ready")),
            ],
        )
        .unwrap();

        assert!(matches!(
            device.feature_state_transition(None, 0x33),
            Err(HdcError::UndeclaredState { .. })
        ));
        assert_eq!(device.feature(0x00).unwrap().state(), 0x00);

        // The error state is always reachable.
        device.feature_state_transition(None, 0xFF).unwrap();
        assert_eq!(device.feature(0x00).unwrap().state(), 0xFF);
    }
}
