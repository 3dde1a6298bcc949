//! Host-side helpers shared by the integration tests: packet building,
//! wire capture reassembly, and a device rigged onto a loopback link.

use hdc_device::{
    Device, Feature, LoopbackLink, MAX_PACKET_PAYLOAD, PACKET_OVERHEAD, PACKET_TERMINATOR,
    checksum,
};

/// Frame one payload into a packet, the way a host would.
pub fn packet(payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= MAX_PACKET_PAYLOAD);
    let mut bytes = Vec::with_capacity(payload.len() + PACKET_OVERHEAD);
    bytes.push(payload.len() as u8);
    bytes.extend_from_slice(payload);
    bytes.push(checksum(payload));
    bytes.push(PACKET_TERMINATOR);
    bytes
}

/// Split a wire capture into packets and reassemble messages, checking
/// the checksum law and terminator on every packet.
pub fn reassemble(mut wire: &[u8]) -> Vec<Vec<u8>> {
    let mut messages = Vec::new();
    let mut current = Vec::new();
    while !wire.is_empty() {
        let ps = wire[0] as usize;
        assert!(
            wire.len() >= ps + PACKET_OVERHEAD,
            "truncated packet in capture: {}",
            hex::encode(wire)
        );
        let payload = &wire[1..1 + ps];
        assert_eq!(checksum(payload), wire[1 + ps], "checksum law violated");
        assert_eq!(wire[2 + ps], PACKET_TERMINATOR, "missing terminator");

        current.extend_from_slice(payload);
        if ps < MAX_PACKET_PAYLOAD {
            messages.push(std::mem::take(&mut current));
        }
        wire = &wire[ps + PACKET_OVERHEAD..];
    }
    assert!(current.is_empty(), "capture ends mid-message");
    messages
}

/// A device on a loopback link, with `MAX_REQ = 128` and roomy TX
/// buffers.
pub struct Rig {
    pub device: Device<LoopbackLink, 128, 1024>,
    pub probe: LoopbackLink,
}

impl Rig {
    pub fn new(features: Vec<Feature>) -> Self {
        let link = LoopbackLink::new();
        let probe = link.clone();
        let device = Device::new(link, features).unwrap();
        Self { device, probe }
    }

    /// Send one request message and collect the reply messages.
    pub fn request(&mut self, payload: &[u8]) -> Vec<Vec<u8>> {
        self.probe.inject(&packet(payload));
        self.device.work().unwrap();
        self.device.flush().unwrap();
        reassemble(&self.probe.take_transmitted())
    }

    /// Push raw bytes (not necessarily a well-formed packet) and
    /// collect whatever the device says.
    pub fn push_raw(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.probe.inject(bytes);
        self.device.work().unwrap();
        self.device.flush().unwrap();
        reassemble(&self.probe.take_transmitted())
    }
}
