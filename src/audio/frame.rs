//! Outbound binary frame: one handler-id byte followed by LE i16 PCM.

use super::pcm::write_pcm16_le;

/// A single binary message for the transport.
///
/// ```text
/// +------------+---------------------------------------+
/// | handler id | PCM s16le, 16 kHz, mono (2 bytes/smp) |
/// +------------+---------------------------------------+
///   byte 0       bytes 1..
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    bytes: Vec<u8>,
}

impl OutboundFrame {
    /// Quantise `samples` (already at 16 kHz) and prefix them with `handler_id`.
    pub fn encode(handler_id: u8, samples: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(1 + samples.len() * 2);
        bytes.push(handler_id);
        write_pcm16_le(samples, &mut bytes);
        Self { bytes }
    }

    pub fn handler_id(&self) -> u8 {
        self.bytes[0]
    }

    /// PCM bytes without the header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[1..]
    }

    /// Number of 16-bit samples carried.
    pub fn sample_count(&self) -> usize {
        self.payload().len() / 2
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_byte_precedes_pcm() {
        let frame = OutboundFrame::encode(7, &[0.0, 1.0, -1.0]);
        assert_eq!(frame.handler_id(), 7);
        assert_eq!(frame.sample_count(), 3);
        assert_eq!(frame.as_bytes(), &[7, 0x00, 0x00, 0xFF, 0x7F, 0x00, 0x80]);
    }

    #[test]
    fn handler_id_covers_full_byte_range() {
        assert_eq!(OutboundFrame::encode(0, &[0.0]).handler_id(), 0);
        assert_eq!(OutboundFrame::encode(255, &[0.0]).into_bytes()[0], 255);
    }
}
