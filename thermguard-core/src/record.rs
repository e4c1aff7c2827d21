//! Records Carried by the Relay Channels
//!
//! ## Framing
//!
//! Relays move raw bytes. Every record is framed as one kind byte followed by a
//! fixed little-endian payload, so a consumer can tell a truncated or foreign
//! frame from a good one before it trusts any field:
//!
//! ```text
//! ┌──────┬──────────────────────────────┐
//! │ kind │ payload (Record::PAYLOAD_LEN)│
//! └──────┴──────────────────────────────┘
//!   1 B
//!
//! SensorSample    kind=1  source:u8 t1:f32 t2:f32 deviation:f32   (14 B)
//! TripleSample    kind=2  raw:[u16;3] celsius:[f32;3]            (19 B)
//! VotedSample     kind=3  code:u16                               ( 3 B)
//! AveragedSample  kind=4  celsius:f32                            ( 5 B)
//! ```
//!
//! Records are write-once: producers encode straight into a relay slot and
//! consumers decode from the borrowed slot before releasing it.

use crate::errors::{RecordError, RecordResult};

/// Tag byte at the start of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// [`SensorSample`]
    SensorSample = 1,
    /// [`TripleSample`]
    TripleSample = 2,
    /// [`VotedSample`]
    VotedSample = 3,
    /// [`AveragedSample`]
    AveragedSample = 4,
}

impl RecordKind {
    /// Parse a tag byte
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(RecordKind::SensorSample),
            2 => Some(RecordKind::TripleSample),
            3 => Some(RecordKind::VotedSample),
            4 => Some(RecordKind::AveragedSample),
            _ => None,
        }
    }
}

/// A fixed-layout value that can travel through a relay
pub trait Record: Sized {
    /// Tag written in front of the payload
    const KIND: RecordKind;

    /// Encoded payload length
    const PAYLOAD_LEN: usize;

    /// Encoded frame length, tag included
    const FRAME_LEN: usize = 1 + Self::PAYLOAD_LEN;

    /// Write the payload; `out` is exactly `PAYLOAD_LEN` long
    fn encode_payload(&self, out: &mut [u8]);

    /// Read the payload; `payload` is exactly `PAYLOAD_LEN` long
    fn decode_payload(payload: &[u8]) -> RecordResult<Self>;

    /// Encode into a slot of exactly `FRAME_LEN` bytes
    fn encode(&self, frame: &mut [u8]) -> RecordResult<()> {
        if frame.len() != Self::FRAME_LEN {
            return Err(RecordError::Length {
                expected: Self::FRAME_LEN,
                actual: frame.len(),
            });
        }
        frame[0] = Self::KIND as u8;
        self.encode_payload(&mut frame[1..]);
        Ok(())
    }

    /// Decode a frame, checking tag and length first
    fn decode(frame: &[u8]) -> RecordResult<Self> {
        let (&tag, payload) = frame.split_first().ok_or(RecordError::Empty)?;
        if tag != Self::KIND as u8 {
            return Err(RecordError::UnexpectedKind { found: tag });
        }
        if payload.len() != Self::PAYLOAD_LEN {
            return Err(RecordError::Length {
                expected: Self::FRAME_LEN,
                actual: frame.len(),
            });
        }
        Self::decode_payload(payload)
    }
}

fn put_f32(out: &mut [u8], at: usize, value: f32) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_f32(input: &[u8], at: usize) -> f32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&input[at..at + 4]);
    f32::from_le_bytes(bytes)
}

fn put_u16(out: &mut [u8], at: usize, value: u16) {
    out[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(input: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([input[at], input[at + 1]])
}

/// Provenance of a [`SensorSample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataSource {
    /// Straight from the sampler
    Sensor = 0,
    /// Enriched by the deviation checker
    Checker = 1,
}

impl TryFrom<u8> for DataSource {
    type Error = RecordError;

    fn try_from(value: u8) -> RecordResult<Self> {
        match value {
            0 => Ok(DataSource::Sensor),
            1 => Ok(DataSource::Checker),
            other => Err(RecordError::UnknownSource(other)),
        }
    }
}

/// Dual-sensor sample, optionally enriched with a deviation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Producer of this record
    pub source: DataSource,
    /// Primary sensor reading (°C)
    pub temperature1: f32,
    /// Secondary sensor reading (°C), zero when unpaired
    pub temperature2: f32,
    /// `|temperature1 - temperature2|`, zero until checked
    pub deviation: f32,
}

impl SensorSample {
    /// Primary-only reading from the sampler
    pub fn from_sensor(temperature1: f32) -> Self {
        Self {
            source: DataSource::Sensor,
            temperature1,
            temperature2: 0.0,
            deviation: 0.0,
        }
    }

    /// Paired reading from the sampler, waiting for the checker
    pub fn paired(temperature1: f32, temperature2: f32) -> Self {
        Self {
            source: DataSource::Sensor,
            temperature1,
            temperature2,
            deviation: 0.0,
        }
    }

    /// Checked record produced by the deviation checker
    pub fn checked(temperature1: f32, temperature2: f32, deviation: f32) -> Self {
        Self {
            source: DataSource::Checker,
            temperature1,
            temperature2,
            deviation,
        }
    }
}

impl Record for SensorSample {
    const KIND: RecordKind = RecordKind::SensorSample;
    const PAYLOAD_LEN: usize = 13;

    fn encode_payload(&self, out: &mut [u8]) {
        out[0] = self.source as u8;
        put_f32(out, 1, self.temperature1);
        put_f32(out, 5, self.temperature2);
        put_f32(out, 9, self.deviation);
    }

    fn decode_payload(payload: &[u8]) -> RecordResult<Self> {
        Ok(Self {
            source: DataSource::try_from(payload[0])?,
            temperature1: get_f32(payload, 1),
            temperature2: get_f32(payload, 5),
            deviation: get_f32(payload, 9),
        })
    }
}

/// Three synchronized readings for the voter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripleSample {
    /// Raw converter codes, one per sensor
    pub raw: [u16; 3],
    /// Converted temperatures (°C), one per sensor
    pub celsius: [f32; 3],
}

impl Record for TripleSample {
    const KIND: RecordKind = RecordKind::TripleSample;
    const PAYLOAD_LEN: usize = 18;

    fn encode_payload(&self, out: &mut [u8]) {
        for (i, code) in self.raw.iter().enumerate() {
            put_u16(out, i * 2, *code);
        }
        for (i, t) in self.celsius.iter().enumerate() {
            put_f32(out, 6 + i * 4, *t);
        }
    }

    fn decode_payload(payload: &[u8]) -> RecordResult<Self> {
        Ok(Self {
            raw: [get_u16(payload, 0), get_u16(payload, 2), get_u16(payload, 4)],
            celsius: [get_f32(payload, 6), get_f32(payload, 10), get_f32(payload, 14)],
        })
    }
}

/// Bitmask majority vote result, a raw converter code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotedSample(pub u16);

impl Record for VotedSample {
    const KIND: RecordKind = RecordKind::VotedSample;
    const PAYLOAD_LEN: usize = 2;

    fn encode_payload(&self, out: &mut [u8]) {
        put_u16(out, 0, self.0);
    }

    fn decode_payload(payload: &[u8]) -> RecordResult<Self> {
        Ok(Self(get_u16(payload, 0)))
    }
}

/// Averaging vote result (°C)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AveragedSample(pub f32);

impl Record for AveragedSample {
    const KIND: RecordKind = RecordKind::AveragedSample;
    const PAYLOAD_LEN: usize = 4;

    fn encode_payload(&self, out: &mut [u8]) {
        put_f32(out, 0, self.0);
    }

    fn decode_payload(payload: &[u8]) -> RecordResult<Self> {
        Ok(Self(get_f32(payload, 0)))
    }
}

/// Anything the monitor channel may deliver
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// From the sampler or the deviation checker
    Sample(SensorSample),
    /// From the bitmask voter
    Voted(VotedSample),
    /// From the averaging voter
    Averaged(AveragedSample),
}

impl Observation {
    /// Decode whichever monitor-bound record the frame holds
    pub fn decode(frame: &[u8]) -> RecordResult<Self> {
        let tag = *frame.first().ok_or(RecordError::Empty)?;
        match RecordKind::from_tag(tag) {
            Some(RecordKind::SensorSample) => SensorSample::decode(frame).map(Observation::Sample),
            Some(RecordKind::VotedSample) => VotedSample::decode(frame).map(Observation::Voted),
            Some(RecordKind::AveragedSample) => {
                AveragedSample::decode(frame).map(Observation::Averaged)
            }
            Some(RecordKind::TripleSample) | None => {
                Err(RecordError::UnexpectedKind { found: tag })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::buffers::MIN_RELAY_CAPACITY;
    use alloc::vec::Vec;

    fn framed<R: Record>(record: &R) -> Vec<u8> {
        let mut frame = alloc::vec![0; R::FRAME_LEN];
        record.encode(&mut frame).unwrap();
        frame
    }

    #[test]
    fn frame_lengths() {
        assert_eq!(SensorSample::FRAME_LEN, 14);
        assert_eq!(TripleSample::FRAME_LEN, 19);
        assert_eq!(VotedSample::FRAME_LEN, 3);
        assert_eq!(AveragedSample::FRAME_LEN, 5);
        assert!(TripleSample::FRAME_LEN <= MIN_RELAY_CAPACITY);
    }

    #[test]
    fn checked_sample_survives_framing() {
        let sample = SensorSample::checked(20.0, 23.5, 3.5);
        let frame = framed(&sample);
        assert_eq!(frame[0], RecordKind::SensorSample as u8);
        assert_eq!(SensorSample::decode(&frame).unwrap(), sample);
    }

    #[test]
    fn short_frame_is_rejected() {
        let frame = framed(&SensorSample::paired(20.0, 21.0));
        let err = SensorSample::decode(&frame[..8]).unwrap_err();
        assert_eq!(err, RecordError::Length { expected: 14, actual: 8 });
        assert_eq!(SensorSample::decode(&[]).unwrap_err(), RecordError::Empty);
    }

    #[test]
    fn encode_needs_an_exact_slot() {
        let mut slot = [0u8; 16];
        assert_eq!(
            SensorSample::paired(20.0, 21.0).encode(&mut slot).unwrap_err(),
            RecordError::Length { expected: 14, actual: 16 }
        );
    }

    #[test]
    fn foreign_kind_is_rejected() {
        let frame = framed(&VotedSample(0x0F0));
        assert_eq!(
            SensorSample::decode(&frame).unwrap_err(),
            RecordError::UnexpectedKind { found: 3 }
        );
    }

    #[test]
    fn unknown_source_is_rejected() {
        let mut frame = framed(&SensorSample::from_sensor(1.0));
        frame[1] = 9;
        assert_eq!(SensorSample::decode(&frame).unwrap_err(), RecordError::UnknownSource(9));
    }

    #[test]
    fn observation_dispatch() {
        let voted = framed(&VotedSample(0x800));
        assert_eq!(Observation::decode(&voted).unwrap(), Observation::Voted(VotedSample(0x800)));

        let triple = framed(&TripleSample { raw: [1, 2, 3], celsius: [1.0, 2.0, 3.0] });
        assert!(Observation::decode(&triple).is_err());
    }
}
