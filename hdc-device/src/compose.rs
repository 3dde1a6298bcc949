//! Double-buffered TX composition.
//!
//! Two equally sized TX buffers act as a two-element message FIFO: one
//! buffer drains through the link while the other fills with packets
//! composed directly in place. Messages are built with strict
//! `begin_message` / `append`* / `end_message` sequencing; payloads
//! larger than 255 bytes split into multiple packets, and a message
//! whose size is an exact multiple of 255 is closed by an extra empty
//! packet so the host can detect its end.
//!
//! Packets never span buffers: a fresh packet only starts once a full
//! packet's worth of capacity is reserved, so a buffer swap can only
//! happen at a packet boundary.

use crate::error::HdcError;
use crate::frame::{MAX_PACKET_PAYLOAD, PACKET_OVERHEAD, PACKET_TERMINATOR, checksum};
use crate::link::{Link, LinkPort};
use crate::message::MessageType;

/// How long `flush` waits for the link to drain before giving up.
pub const FLUSH_TIMEOUT_MS: u64 = 100;

// ── Composer state ───────────────────────────────────────────────

/// The packet currently being filled. Its bytes live in the
/// composition buffer but are not committed to the buffer length until
/// finalized.
struct OpenPacket {
    /// Offset of the payload-size prefix byte.
    start: usize,
    /// Payload bytes written so far.
    payload: usize,
}

/// Buffer state of the double-buffered transmitter.
pub(crate) struct Composer {
    bufs: [Box<[u8]>; 2],
    len: [usize; 2],
    /// Buffer owned by the link (in flight, or idle after draining).
    current_tx: usize,
    cap: usize,
    open: Option<OpenPacket>,
}

impl Composer {
    pub(crate) fn new(cap: usize) -> Self {
        debug_assert!(cap >= MAX_PACKET_PAYLOAD + PACKET_OVERHEAD);
        Self {
            bufs: [
                vec![0u8; cap].into_boxed_slice(),
                vec![0u8; cap].into_boxed_slice(),
            ],
            len: [0, 0],
            current_tx: 0,
            cap,
            open: None,
        }
    }

    /// Index of the buffer currently being composed into.
    fn composition_index(&self) -> usize {
        1 - self.current_tx
    }

    /// Commit the open packet: write its size prefix, checksum and
    /// terminator, and account its bytes into the buffer length.
    fn finalize(&mut self, open: OpenPacket) {
        let comp = self.composition_index();
        let payload_start = open.start + 1;
        let ck = checksum(&self.bufs[comp][payload_start..payload_start + open.payload]);

        let buf = &mut self.bufs[comp];
        buf[open.start] = open.payload as u8;
        buf[payload_start + open.payload] = ck;
        buf[payload_start + open.payload + 1] = PACKET_TERMINATOR;

        self.len[comp] += open.payload + PACKET_OVERHEAD;
    }
}

// ── TxHalf ───────────────────────────────────────────────────────

/// The transmit path: composer state plus the link it drains through.
pub(crate) struct TxHalf<'a> {
    pub(crate) composer: &'a mut Composer,
    pub(crate) link: &'a mut dyn Link,
    pub(crate) port: &'a LinkPort,
}

impl TxHalf<'_> {
    /// Start composing a new message. The first packet's size prefix is
    /// reserved but left unpopulated until the packet is finalized.
    pub(crate) fn begin_message(&mut self) -> Result<(), HdcError> {
        if self.composer.open.is_some() {
            return Err(HdcError::Compose("message already open"));
        }
        self.open_packet()
    }

    /// Append message payload, finalizing and re-opening packets at the
    /// 255-byte boundary.
    pub(crate) fn append(&mut self, data: &[u8]) -> Result<(), HdcError> {
        let Some(mut open) = self.composer.open.take() else {
            return Err(HdcError::Compose("append outside an open message"));
        };

        let mut remaining = data;
        loop {
            let comp = self.composer.composition_index();
            let space = MAX_PACKET_PAYLOAD - open.payload;
            let n = remaining.len().min(space);
            let dst = open.start + 1 + open.payload;
            self.composer.bufs[comp][dst..dst + n].copy_from_slice(&remaining[..n]);
            open.payload += n;
            remaining = &remaining[n..];

            if open.payload == MAX_PACKET_PAYLOAD {
                self.composer.finalize(open);
                self.reserve(MAX_PACKET_PAYLOAD + PACKET_OVERHEAD)?;
                let comp = self.composer.composition_index();
                open = OpenPacket {
                    start: self.composer.len[comp],
                    payload: 0,
                };
            }
            if remaining.is_empty() {
                break;
            }
        }

        self.composer.open = Some(open);
        Ok(())
    }

    /// Finalize the last packet of the message. A message that ended
    /// exactly on a packet boundary closes with an empty packet here.
    pub(crate) fn end_message(&mut self) -> Result<(), HdcError> {
        let Some(open) = self.composer.open.take() else {
            return Err(HdcError::Compose("end without an open message"));
        };
        self.composer.finalize(open);
        Ok(())
    }

    /// Compose a whole message from one contiguous buffer.
    pub(crate) fn append_buffer(&mut self, message: &[u8]) -> Result<(), HdcError> {
        self.begin_message()?;
        self.append(message)?;
        self.end_message()
    }

    /// The canonical shape used by command replies and events. The
    /// exception ID is present on Command replies only.
    pub(crate) fn compose_structured(
        &mut self,
        msg_type: MessageType,
        feature_id: u8,
        cmd_or_evt_id: u8,
        exc_id: Option<u8>,
        prefix: &[u8],
        suffix: &[u8],
    ) -> Result<(), HdcError> {
        self.begin_message()?;
        self.append(&[msg_type as u8, feature_id, cmd_or_evt_id])?;
        if let Some(exc) = exc_id {
            self.append(&[exc])?;
        }
        if !prefix.is_empty() {
            self.append(prefix)?;
        }
        if !suffix.is_empty() {
            self.append(suffix)?;
        }
        self.end_message()
    }

    /// Open a fresh packet, reserving a full packet's worth of capacity
    /// so the packet cannot outgrow its buffer.
    fn open_packet(&mut self) -> Result<(), HdcError> {
        self.reserve(MAX_PACKET_PAYLOAD + PACKET_OVERHEAD)?;
        let comp = self.composer.composition_index();
        self.composer.open = Some(OpenPacket {
            start: self.composer.len[comp],
            payload: 0,
        });
        Ok(())
    }

    /// Ensure `needed` bytes of composition capacity.
    ///
    /// When the composition buffer is too full, busy-waits for the
    /// in-flight transmit to drain, swaps buffer roles and kicks off
    /// transmission of everything composed so far.
    fn reserve(&mut self, needed: usize) -> Result<(), HdcError> {
        let comp = self.composer.composition_index();
        if self.composer.len[comp] + needed <= self.composer.cap {
            return Ok(());
        }

        while !self.port.tx_idle() {
            std::thread::yield_now();
        }

        // The drained buffer becomes the composition buffer; the one we
        // were composing goes out on the wire.
        self.composer.len[self.composer.current_tx] = 0;
        self.composer.current_tx = comp;

        let idx = self.composer.current_tx;
        tracing::trace!(bytes = self.composer.len[idx], "tx buffer swap");
        self.port.begin_tx();
        self.link
            .start_tx(&self.composer.bufs[idx][..self.composer.len[idx]])?;
        Ok(())
    }

    /// Start transmitting the composition buffer if it holds any
    /// finalized packets. Requesting the full capacity does the right
    /// thing: an empty buffer satisfies the reservation and nothing
    /// happens, a non-empty one cannot and gets swapped out.
    pub(crate) fn pump(&mut self) -> Result<(), HdcError> {
        if self.composer.open.is_some() {
            // An open packet is not transmittable yet.
            return Ok(());
        }
        self.reserve(self.composer.cap)
    }

    /// Transmit anything pending, then wait for the link to drain,
    /// bounded by [`FLUSH_TIMEOUT_MS`]. Returns quietly on timeout.
    pub(crate) fn flush(&mut self) -> Result<(), HdcError> {
        self.pump()?;

        let deadline = self.link.now_ms() + FLUSH_TIMEOUT_MS;
        while !self.port.tx_idle() {
            if self.link.now_ms() > deadline {
                tracing::warn!("flush timed out waiting for tx completion");
                return Ok(());
            }
            std::thread::yield_now();
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::frame::{self};
    use crate::link::loopback::LoopbackLink;

    struct Rig {
        composer: Composer,
        link: LoopbackLink,
        probe: LoopbackLink,
        port: Arc<LinkPort>,
    }

    impl Rig {
        fn new(cap: usize) -> Self {
            let mut link = LoopbackLink::new();
            let probe = link.clone();
            let port = Arc::new(LinkPort::new(16));
            link.attach(port.clone());
            Self {
                composer: Composer::new(cap),
                link,
                probe,
                port,
            }
        }

        fn tx(&mut self) -> TxHalf<'_> {
            TxHalf {
                composer: &mut self.composer,
                link: &mut self.link,
                port: &self.port,
            }
        }
    }

    /// Host-side reassembly: split a wire capture into packets and glue
    /// payloads into messages.
    fn reassemble(mut wire: &[u8]) -> Vec<Vec<u8>> {
        let mut messages = Vec::new();
        let mut current = Vec::new();
        while !wire.is_empty() {
            let ps = wire[0] as usize;
            assert!(wire.len() >= ps + PACKET_OVERHEAD, "truncated packet");
            let payload = &wire[1..1 + ps];

            // Invariant: checksum law and terminator on every packet.
            assert_eq!(frame::checksum(payload), wire[1 + ps]);
            assert_eq!(wire[2 + ps], PACKET_TERMINATOR);

            current.extend_from_slice(payload);
            if ps < MAX_PACKET_PAYLOAD {
                messages.push(std::mem::take(&mut current));
            }
            wire = &wire[ps + PACKET_OVERHEAD..];
        }
        assert!(current.is_empty(), "unterminated message");
        messages
    }

    #[test]
    fn small_message_roundtrip() {
        let mut rig = Rig::new(258);
        let mut tx = rig.tx();
        tx.append_buffer(&[0xF1, 0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        tx.pump().unwrap();

        let messages = reassemble(&rig.probe.transmitted());
        assert_eq!(messages, vec![vec![0xF1, 0xDE, 0xAD, 0xBE, 0xEF]]);
    }

    #[test]
    fn message_of_exactly_255_gets_empty_trailer() {
        let mut rig = Rig::new(1024);
        let message = vec![0x42u8; 255];
        let mut tx = rig.tx();
        tx.append_buffer(&message).unwrap();
        tx.pump().unwrap();

        let wire = rig.probe.transmitted();
        assert_eq!(wire[0], 255);
        // The empty packet directly follows the full one.
        assert_eq!(&wire[258..], &[0x00, 0x00, PACKET_TERMINATOR]);
        assert_eq!(reassemble(&wire), vec![message]);
    }

    #[test]
    fn long_message_splits_into_packets() {
        let mut rig = Rig::new(1024);
        let message: Vec<u8> = (0..600).map(|i| (i % 251) as u8).collect();
        let mut tx = rig.tx();
        tx.append_buffer(&message).unwrap();
        tx.flush().unwrap();

        assert_eq!(reassemble(&rig.probe.transmitted()), vec![message]);
    }

    #[test]
    fn message_of_510_is_two_full_packets_plus_empty() {
        let mut rig = Rig::new(1024);
        let message = vec![0x11u8; 510];
        let mut tx = rig.tx();
        tx.append_buffer(&message).unwrap();
        tx.flush().unwrap();

        let wire = rig.probe.transmitted();
        assert_eq!(wire.len(), 2 * 258 + 3);
        assert_eq!(reassemble(&wire), vec![message]);
    }

    #[test]
    fn piecewise_append_equals_contiguous() {
        let mut rig = Rig::new(1024);
        {
            let mut tx = rig.tx();
            tx.begin_message().unwrap();
            tx.append(&[0xF3, 0x00]).unwrap();
            tx.append(&[0xF1]).unwrap();
            tx.append(&[0x01, 0x02]).unwrap();
            tx.end_message().unwrap();
            tx.pump().unwrap();
        }
        assert_eq!(
            reassemble(&rig.probe.transmitted()),
            vec![vec![0xF3, 0x00, 0xF1, 0x01, 0x02]]
        );
    }

    #[test]
    fn multiple_messages_share_one_buffer() {
        let mut rig = Rig::new(1024);
        let mut tx = rig.tx();
        tx.append_buffer(&[0x01]).unwrap();
        tx.append_buffer(&[0x02, 0x03]).unwrap();
        tx.pump().unwrap();

        assert_eq!(
            reassemble(&rig.probe.transmitted()),
            vec![vec![0x01], vec![0x02, 0x03]]
        );
    }

    #[test]
    fn capacity_overflow_swaps_buffers() {
        // Minimum-size buffers: each holds exactly one full packet, so a
        // second message forces the first out on the wire.
        let mut rig = Rig::new(258);
        let first = vec![0xAAu8; 200];
        let second = vec![0xBBu8; 200];
        let mut tx = rig.tx();
        tx.append_buffer(&first).unwrap();
        tx.append_buffer(&second).unwrap();
        tx.flush().unwrap();

        assert_eq!(reassemble(&rig.probe.transmitted()), vec![first, second]);
    }

    #[test]
    fn structured_command_reply_layout() {
        let mut rig = Rig::new(258);
        let mut tx = rig.tx();
        tx.compose_structured(
            MessageType::Command,
            0x00,
            0xF0,
            Some(0x00),
            &[0xAB, 0xCD],
            &[],
        )
        .unwrap();
        tx.pump().unwrap();

        let messages = reassemble(&rig.probe.transmitted());
        assert_eq!(messages, vec![vec![0xF2, 0x00, 0xF0, 0x00, 0xAB, 0xCD]]);
    }

    #[test]
    fn structured_event_has_no_exception_byte() {
        let mut rig = Rig::new(258);
        let mut tx = rig.tx();
        tx.compose_structured(MessageType::Event, 0x00, 0xF1, None, &[0x01], &[0x02])
            .unwrap();
        tx.pump().unwrap();

        assert_eq!(
            reassemble(&rig.probe.transmitted()),
            vec![vec![0xF3, 0x00, 0xF1, 0x01, 0x02]]
        );
    }

    #[test]
    fn sequencing_misuse_is_rejected() {
        let mut rig = Rig::new(258);
        let mut tx = rig.tx();
        assert!(matches!(tx.append(&[1]), Err(HdcError::Compose(_))));
        assert!(matches!(tx.end_message(), Err(HdcError::Compose(_))));

        tx.begin_message().unwrap();
        assert!(matches!(tx.begin_message(), Err(HdcError::Compose(_))));
        tx.end_message().unwrap();
    }

    #[test]
    fn pump_with_empty_buffer_transmits_nothing() {
        let mut rig = Rig::new(258);
        rig.tx().pump().unwrap();
        assert!(rig.probe.transmitted().is_empty());
    }

    #[test]
    fn flush_times_out_quietly_on_a_stalled_link() {
        let mut rig = Rig::new(258);
        rig.probe.set_tx_stalled(true);
        let mut tx = rig.tx();
        tx.append_buffer(&[0x01]).unwrap();
        tx.flush().unwrap();

        // The bytes went to the link even though completion never came.
        assert_eq!(rig.probe.transmitted().len(), 1 + PACKET_OVERHEAD);
    }
}
