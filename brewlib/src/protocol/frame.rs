use super::crc::{crc16, CRC_CCITT};
use super::serialize::{BufferFull, Serializer, SerializerArray, SerializerCrc, SerializerLength};
use super::{MessageType, CRC_LEN, FRAME_BUFFER_LEN, HEADER_LEN, MAX_FRAME_LEN, MAX_PAYLOAD, SYNC_BYTE};

/// An error while building a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// The payload does not fit in a single frame.
    PayloadTooLarge { len: usize, max: usize },
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload of {} bytes exceeds maximum of {}", len, max)
            }
        }
    }
}

/// A validated frame, as received from the peer.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    typ: u8,
    seq: u8,
    len: u8,
    payload: [u8; MAX_PAYLOAD],
    crc: u16,
}

impl Packet {
    /// Build a packet by hand. The CRC is computed here.
    pub fn new(typ: u8, seq: u8, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }

        let len = payload.len() as u8;
        let mut data = [0; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);

        let mut ser = SerializerCrc::new(&CRC_CCITT, SerializerLength::new());
        write_body(&mut ser, typ, len, seq, payload).unwrap_or_else(|e| match e {});
        let (crc, _) = ser.finalize();

        Ok(Self {
            typ,
            seq,
            len,
            payload: data,
            crc,
        })
    }

    pub fn typ(&self) -> u8 {
        self.typ
    }

    /// The message type, if this type code is one we know about.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_code(self.typ)
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len as usize]
    }

    pub fn crc(&self) -> u16 {
        self.crc
    }
}

impl core::fmt::Debug for Packet {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Packet")
            .field("typ", &self.typ)
            .field("seq", &self.seq)
            .field("payload", &self.payload())
            .field("crc", &self.crc)
            .finish()
    }
}

/// Where the decoder is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiverState {
    WaitingForSync,
    GotType,
    GotLength,
    GotSequence,
    ReadingPayload,
    ReadingChecksum,
}

/// Something notable produced by [Decoder::push].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Decoded {
    /// A complete frame with a valid CRC.
    Packet(Packet),
    /// A complete frame whose CRC did not match. It was discarded.
    CrcError { received: u16, expected: u16 },
    /// The frame outgrew the scratch buffer. It was discarded.
    Overflow,
}

/// Byte-at-a-time frame decoder.
///
/// Anything that is not a sync byte is dropped while waiting for a
/// frame, so the decoder recovers from garbage on its own.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Decoder {
    state: ReceiverState,
    buffer: [u8; FRAME_BUFFER_LEN],
    index: usize,
    length: u8,
    packets_received: u32,
    packet_errors: u32,
}

impl Decoder {
    pub const fn new() -> Self {
        Self {
            state: ReceiverState::WaitingForSync,
            buffer: [0; FRAME_BUFFER_LEN],
            index: 0,
            length: 0,
            packets_received: 0,
            packet_errors: 0,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Frames that decoded with a valid CRC.
    pub fn packets_received(&self) -> u32 {
        self.packets_received
    }

    /// Frames discarded for a bad CRC or overflow.
    pub fn packet_errors(&self) -> u32 {
        self.packet_errors
    }

    /// Drop any partial frame. Counters are kept.
    pub fn reset(&mut self) {
        self.state = ReceiverState::WaitingForSync;
        self.index = 0;
        self.length = 0;
    }

    /// Feed one byte.
    pub fn push(&mut self, byte: u8) -> Option<Decoded> {
        use ReceiverState::*;

        let mut result = None;
        match self.state {
            WaitingForSync => {
                if byte == SYNC_BYTE {
                    self.index = 0;
                    self.state = GotType;
                }
            }
            GotType => {
                self.store(byte);
                self.state = GotLength;
            }
            GotLength => {
                self.store(byte);
                self.length = byte;
                self.state = GotSequence;
            }
            GotSequence => {
                self.store(byte);
                self.state = if self.length == 0 {
                    ReadingChecksum
                } else {
                    ReadingPayload
                };
            }
            ReadingPayload => {
                self.store(byte);
                if self.index >= self.body_len() {
                    self.state = ReadingChecksum;
                }
            }
            ReadingChecksum => {
                self.store(byte);
                if self.index >= self.body_len() + CRC_LEN {
                    result = Some(self.finish());
                    self.reset();
                }
            }
        }

        // a frame still in progress with nowhere left to go
        if self.state != WaitingForSync && self.index >= FRAME_BUFFER_LEN {
            self.reset();
            self.packet_errors = self.packet_errors.wrapping_add(1);
            result = Some(Decoded::Overflow);
        }

        result
    }

    /// Feed a block of bytes, yielding everything of note along the way.
    pub fn decode<'a>(&'a mut self, bytes: &'a [u8]) -> impl Iterator<Item = Decoded> + 'a {
        bytes.iter().filter_map(move |b| self.push(*b))
    }

    fn body_len(&self) -> usize {
        HEADER_LEN + self.length as usize
    }

    fn store(&mut self, byte: u8) {
        // index never reaches the end while a frame is open, see push()
        if let Some(slot) = self.buffer.get_mut(self.index) {
            *slot = byte;
        }
        self.index += 1;
    }

    fn finish(&mut self) -> Decoded {
        let body_len = self.body_len();
        let received = u16::from_le_bytes([self.buffer[body_len], self.buffer[body_len + 1]]);
        let expected = crc16(&self.buffer[..body_len]);

        if received != expected {
            self.packet_errors = self.packet_errors.wrapping_add(1);
            return Decoded::CrcError { received, expected };
        }

        self.packets_received = self.packets_received.wrapping_add(1);
        let len = self.length as usize;
        let mut payload = [0; MAX_PAYLOAD];
        payload[..len].copy_from_slice(&self.buffer[HEADER_LEN..body_len]);
        Decoded::Packet(Packet {
            typ: self.buffer[0],
            seq: self.buffer[2],
            len: self.length,
            payload,
            crc: received,
        })
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Decoder")
            .field("state", &self.state)
            .field("buffered", &&self.buffer[..self.index.min(FRAME_BUFFER_LEN)])
            .field("packets_received", &self.packets_received)
            .field("packet_errors", &self.packet_errors)
            .finish()
    }
}

/// An encoded frame, ready to be written out.
pub type FrameBuf = SerializerArray<MAX_FRAME_LEN>;

/// Frame encoder. Owns the outbound sequence counter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Encoder {
    seq: u8,
}

impl Encoder {
    pub const fn new() -> Self {
        Self { seq: 0 }
    }

    /// The sequence number the next frame will carry.
    pub fn next_seq(&self) -> u8 {
        self.seq
    }

    /// Encode a frame. On error nothing is produced and the sequence
    /// number is not consumed.
    pub fn encode(&mut self, typ: u8, payload: &[u8]) -> Result<FrameBuf, FrameError> {
        let too_large = FrameError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD,
        };
        if payload.len() > MAX_PAYLOAD {
            return Err(too_large);
        }

        let mut buf = FrameBuf::new();
        write_frame(&mut buf, typ, self.seq, payload).map_err(|BufferFull| too_large)?;
        self.seq = self.seq.wrapping_add(1);
        Ok(buf)
    }
}

/// Write a whole frame, sync byte through CRC, to a serializer.
///
/// `payload` must be at most [MAX_PAYLOAD] bytes.
pub fn write_frame<S>(ser: &mut S, typ: u8, seq: u8, payload: &[u8]) -> Result<(), S::Error>
where
    S: Serializer,
{
    ser.write_u8(SYNC_BYTE)?;

    let mut crc_ser = SerializerCrc::new(&CRC_CCITT, ser);
    write_body(&mut crc_ser, typ, payload.len() as u8, seq, payload)?;
    let (crc, ser) = crc_ser.finalize();

    ser.write_le_u16(crc)
}

fn write_body<S>(ser: &mut S, typ: u8, len: u8, seq: u8, payload: &[u8]) -> Result<(), S::Error>
where
    S: Serializer,
{
    ser.write_u8(typ)?;
    ser.write_u8(len)?;
    ser.write_u8(seq)?;
    ser.write_bytes(payload)
}
