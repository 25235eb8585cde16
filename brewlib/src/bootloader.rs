//! The raw byte protocol spoken by the peer's bootloader.
//!
//! While the bootloader runs, the link carries no frames at all. The
//! peer announces itself with [BOOTLOADER_ACK], the host streams the
//! image as XOR-checked chunks, and the peer answers each chunk with a
//! single progress byte. A [Bootloader] session holds the [Link] paused
//! for as long as it lives.

use embedded_hal::delay::DelayNs;
use embedded_io::{ErrorType, Read, ReadReady, Write};

use crate::link::write_fully;
use crate::protocol::serialize::{Serializer, SerializerArray, SerializerXor};
use crate::time::{self, Clock, Duration};
use crate::{Link, LinkError};

/// Sent by the peer once its bootloader is ready for data.
pub const BOOTLOADER_ACK: [u8; 4] = [0xb0, 0x07, 0xac, 0x4b];

/// Starts every chunk.
pub const CHUNK_MAGIC: [u8; 2] = [0x55, 0xaa];

/// Largest amount of data in one chunk.
pub const MAX_CHUNK_LEN: usize = 256;

/// Chunk number that marks the end of the transfer.
pub const END_CHUNK: u32 = 0xffff_ffff;

/// Data carried by the end-of-transfer chunk.
pub const END_DATA: [u8; 2] = [0xaa, 0x55];

/// Progress byte: the chunk was written.
pub const CHUNK_OK: u8 = 0xaa;

/// Progress byte: the chunk failed. An error code follows.
pub const CHUNK_ERROR: u8 = 0xff;

/// Magic, chunk number, length, data, checksum.
pub const CHUNK_FRAME_MAX: usize = 2 + 4 + 2 + MAX_CHUNK_LEN + 1;

/// Finds [BOOTLOADER_ACK] in a byte stream, one byte at a time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AckMatcher {
    index: usize,
}

impl AckMatcher {
    pub const fn new() -> Self {
        Self { index: 0 }
    }

    /// Feed one byte. Returns `true` when it completes the pattern.
    pub fn push(&mut self, byte: u8) -> bool {
        if byte == BOOTLOADER_ACK[self.index] {
            self.index += 1;
        } else if byte == BOOTLOADER_ACK[0] {
            self.index = 1;
        } else {
            self.index = 0;
        }

        if self.index == BOOTLOADER_ACK.len() {
            self.index = 0;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }
}

/// Write one chunk. `data` must fit in a `u16` length; the caller
/// enforces [MAX_CHUNK_LEN].
pub fn write_chunk<S>(mut ser: S, chunk: u32, data: &[u8]) -> Result<(), S::Error>
where
    S: Serializer,
{
    ser.write_bytes(&CHUNK_MAGIC)?;
    ser.write_le_u32(chunk)?;
    ser.write_le_u16(data.len() as u16)?;

    // only the data is checksummed
    let mut xor = SerializerXor::new(&mut ser);
    xor.write_bytes(data)?;
    let (checksum, ser) = xor.finalize();
    ser.write_u8(checksum)
}

/// Tuning for a firmware update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashConfig {
    /// Image bytes per chunk, at most [MAX_CHUNK_LEN].
    pub chunk_size: usize,
    /// How many times to ask the peer to enter its bootloader.
    pub entry_attempts: u32,
    /// How long each attempt waits for [BOOTLOADER_ACK].
    pub ready_timeout: Duration,
    /// Delay before the second attempt, doubled for every one after.
    pub entry_backoff: Duration,
    pub entry_backoff_max: Duration,
    /// Longest time spent throwing away input between attempts.
    pub drain_limit: Duration,
    /// Pause after [BOOTLOADER_ACK] before streaming starts.
    pub settle: Duration,
    /// How long the peer may take to write one chunk.
    pub chunk_ack_timeout: Duration,
}

impl FlashConfig {
    /// Delay before entry attempt number `attempt`, counting from 0.
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_ticks(0);
        }
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let ticks = self.entry_backoff.ticks().saturating_mul(factor);
        Duration::from_ticks(ticks.min(self.entry_backoff_max.ticks()))
    }
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            entry_attempts: 5,
            ready_timeout: Duration::millis(5000),
            entry_backoff: Duration::millis(200),
            entry_backoff_max: Duration::millis(2000),
            drain_limit: Duration::millis(200),
            settle: Duration::millis(150),
            chunk_ack_timeout: Duration::millis(2000),
        }
    }
}

/// Told about every chunk the peer accepts.
pub trait Progress {
    fn chunk_sent(&mut self, sent: usize, total: usize) {
        let _ = (sent, total);
    }
}

impl Progress for () {}

impl<T> Progress for &mut T
where
    T: Progress + ?Sized,
{
    fn chunk_sent(&mut self, sent: usize, total: usize) {
        (**self).chunk_sent(sent, total)
    }
}

/// What a finished transfer sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashSummary {
    /// Data chunks, not counting the end marker.
    pub chunks: u32,
    pub bytes: usize,
}

/// An error type for the bootloader transport.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootloaderError<E> {
    /// Error in the underlying port.
    Io(E),
    /// The link is not paused for the bootloader.
    WrongMode,
    /// Chunk data longer than [MAX_CHUNK_LEN]. Nothing was written.
    ChunkTooLarge { len: usize, max: usize },
    /// [FlashConfig::chunk_size] is zero or too large.
    InvalidChunkSize,
    /// The peer never sent [BOOTLOADER_ACK].
    AckTimeout,
    /// The peer never confirmed a chunk.
    ChunkAckTimeout { chunk: u32 },
    /// The peer failed to write a chunk.
    PeerError { chunk: u32, code: u8 },
    /// The port stopped accepting bytes partway through a chunk. Chunks
    /// already sent stay sent.
    ShortWrite,
    /// The bootloader command could not be sent.
    CommandFailed,
}

#[cfg(feature = "std")]
impl<E> std::error::Error for BootloaderError<E> where E: core::fmt::Debug {}

impl<E> core::fmt::Display for BootloaderError<E>
where
    E: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {:?}", e),
            Self::WrongMode => write!(f, "link is not paused for the bootloader"),
            Self::ChunkTooLarge { len, max } => {
                write!(f, "chunk of {} bytes is over the limit of {}", len, max)
            }
            Self::InvalidChunkSize => write!(f, "invalid chunk size"),
            Self::AckTimeout => write!(f, "timed out waiting for bootloader"),
            Self::ChunkAckTimeout { chunk } => {
                write!(f, "timed out waiting for peer to accept chunk {}", chunk)
            }
            Self::PeerError { chunk, code } => {
                write!(f, "peer reported error 0x{:02x} on chunk {}", code, chunk)
            }
            Self::ShortWrite => write!(f, "short write"),
            Self::CommandFailed => write!(f, "could not send bootloader command"),
        }
    }
}

impl<E> From<E> for BootloaderError<E> {
    fn from(other: E) -> Self {
        Self::Io(other)
    }
}

impl<E> From<LinkError<E>> for BootloaderError<E> {
    fn from(other: LinkError<E>) -> Self {
        match other {
            LinkError::Io(e) => Self::Io(e),
            LinkError::WrongMode => Self::WrongMode,
            LinkError::ShortWrite => Self::ShortWrite,
            LinkError::Frame(_) => Self::CommandFailed,
        }
    }
}

fn delay<D>(clock: &mut D, duration: Duration)
where
    D: DelayNs,
{
    clock.delay_ms(duration.ticks().try_into().unwrap_or(u32::MAX));
}

impl<P, C> Link<P, C>
where
    P: ErrorType,
{
    /// Start a bootloader session on a link that is already paused.
    pub fn bootloader(&mut self) -> Result<Bootloader<'_, P, C>, BootloaderError<P::Error>> {
        if !self.is_paused() {
            return Err(BootloaderError::WrongMode);
        }
        Ok(Bootloader { link: self })
    }
}

impl<P, C> Link<P, C>
where
    P: Read + ReadReady + Write,
    C: Clock + DelayNs,
{
    /// Ask the peer to reboot into its bootloader and wait until it is
    /// ready for data.
    ///
    /// Each attempt sends the bootloader command through the backoff
    /// gate, pauses the link and waits for [BOOTLOADER_ACK]. Failed
    /// attempts resume the link, drain the input and back off before
    /// the next one. On success the link stays paused, stale input is
    /// thrown away, and the returned session owns the port.
    pub fn enter_bootloader_mode(
        &mut self,
        config: &FlashConfig,
    ) -> Result<Bootloader<'_, P, C>, BootloaderError<P::Error>> {
        let mut failure = BootloaderError::CommandFailed;

        for attempt in 0..config.entry_attempts {
            if attempt > 0 {
                self.drain_raw(config.drain_limit)?;
                delay(&mut self.clock, config.retry_backoff(attempt));
            }

            match self.enter_bootloader() {
                Ok(()) => {}
                Err(nb::Error::WouldBlock) => {
                    failure = BootloaderError::CommandFailed;
                    continue;
                }
                Err(nb::Error::Other(e)) => return Err(e.into()),
            }

            self.pause();
            let result = self.wait_raw_ack(config.ready_timeout);
            match result {
                Ok(()) => {
                    delay(&mut self.clock, config.settle);
                    self.drain_raw(config.drain_limit)?;
                    return Ok(Bootloader { link: self });
                }
                Err(BootloaderError::AckTimeout) => {
                    self.resume();
                    failure = BootloaderError::AckTimeout;
                }
                Err(e) => {
                    self.resume();
                    return Err(e);
                }
            }
        }

        Err(failure)
    }

    /// Next raw byte, or `None` once `timeout` has passed since `start`.
    fn next_raw_byte(
        &mut self,
        start: time::Instant,
        timeout: Duration,
    ) -> Result<Option<u8>, P::Error> {
        loop {
            if time::since(self.clock.now(), start) >= timeout {
                return Ok(None);
            }
            if self.port.read_ready()? {
                let mut byte = [0; 1];
                if self.port.read(&mut byte)? == 1 {
                    return Ok(Some(byte[0]));
                }
            }
            self.clock.delay_ms(1);
        }
    }

    fn wait_raw_ack(&mut self, timeout: Duration) -> Result<(), BootloaderError<P::Error>> {
        let start = self.clock.now();
        let mut matcher = AckMatcher::new();
        while let Some(byte) = self.next_raw_byte(start, timeout)? {
            if matcher.push(byte) {
                return Ok(());
            }
        }
        Err(BootloaderError::AckTimeout)
    }

    /// Throw away whatever input is ready, for at most `limit`.
    fn drain_raw(&mut self, limit: Duration) -> Result<usize, P::Error> {
        let start = self.clock.now();
        let mut buf = [0; 64];
        let mut drained = 0;
        while time::since(self.clock.now(), start) < limit && self.port.read_ready()? {
            let amt = self.port.read(&mut buf)?;
            if amt == 0 {
                break;
            }
            drained += amt;
        }
        Ok(drained)
    }
}

/// A paused [Link] handed over to the bootloader transport.
///
/// The link resumes framed traffic when this is dropped.
#[derive(Debug)]
pub struct Bootloader<'a, P, C> {
    link: &'a mut Link<P, C>,
}

impl<'a, P, C> Bootloader<'a, P, C> {
    pub fn link(&self) -> &Link<P, C> {
        self.link
    }

    /// End the session. The link goes back to framed traffic and the
    /// peer reads as disconnected until its new firmware speaks.
    pub fn finish(self) {
        self.link.clear_connection_state();
    }
}

impl<'a, P, C> Drop for Bootloader<'a, P, C> {
    fn drop(&mut self) {
        self.link.resume();
    }
}

impl<'a, P, C> Bootloader<'a, P, C>
where
    P: Read + ReadReady + Write,
    C: Clock + DelayNs,
{
    fn check_mode(&self) -> Result<(), BootloaderError<P::Error>> {
        if self.link.is_paused() {
            Ok(())
        } else {
            Err(BootloaderError::WrongMode)
        }
    }

    /// Wait for [BOOTLOADER_ACK].
    pub fn wait_for_ack(&mut self, timeout: Duration) -> Result<(), BootloaderError<P::Error>> {
        self.check_mode()?;
        self.link.wait_raw_ack(timeout)
    }

    /// Send one chunk. Returns the number of data bytes sent.
    pub fn stream_chunk(
        &mut self,
        chunk: u32,
        data: &[u8],
    ) -> Result<usize, BootloaderError<P::Error>> {
        self.check_mode()?;
        if data.len() > MAX_CHUNK_LEN {
            return Err(BootloaderError::ChunkTooLarge {
                len: data.len(),
                max: MAX_CHUNK_LEN,
            });
        }

        let mut frame = SerializerArray::<CHUNK_FRAME_MAX>::new();
        write_chunk(&mut frame, chunk, data).map_err(|_| BootloaderError::ChunkTooLarge {
            len: data.len(),
            max: MAX_CHUNK_LEN,
        })?;

        if !write_fully(&mut self.link.port, &frame)? {
            return Err(BootloaderError::ShortWrite);
        }
        self.link.port.flush()?;
        Ok(data.len())
    }

    /// Tell the peer the image is complete.
    pub fn send_end(&mut self) -> Result<(), BootloaderError<P::Error>> {
        self.stream_chunk(END_CHUNK, &END_DATA).map(|_| ())
    }

    /// Wait for the peer to confirm `chunk`. Bytes other than the
    /// progress markers are skipped.
    pub fn wait_chunk_ack(
        &mut self,
        chunk: u32,
        timeout: Duration,
    ) -> Result<(), BootloaderError<P::Error>> {
        self.check_mode()?;
        let start = self.link.clock.now();
        while let Some(byte) = self.link.next_raw_byte(start, timeout)? {
            match byte {
                CHUNK_OK => return Ok(()),
                CHUNK_ERROR => {
                    let mut code = [0; 1];
                    if self.link.port.read_ready()? {
                        self.link.port.read(&mut code)?;
                    }
                    return Err(BootloaderError::PeerError {
                        chunk,
                        code: code[0],
                    });
                }
                _ => {}
            }
        }
        Err(BootloaderError::ChunkAckTimeout { chunk })
    }

    /// Send a whole image, one confirmed chunk at a time, followed by
    /// the end marker.
    pub fn stream_firmware<G>(
        &mut self,
        image: &[u8],
        config: &FlashConfig,
        mut progress: G,
    ) -> Result<FlashSummary, BootloaderError<P::Error>>
    where
        G: Progress,
    {
        if config.chunk_size == 0 || config.chunk_size > MAX_CHUNK_LEN {
            return Err(BootloaderError::InvalidChunkSize);
        }

        let mut summary = FlashSummary {
            chunks: 0,
            bytes: 0,
        };
        for data in image.chunks(config.chunk_size) {
            let chunk = summary.chunks;
            summary.bytes += self.stream_chunk(chunk, data)?;
            self.wait_chunk_ack(chunk, config.chunk_ack_timeout)?;
            summary.chunks += 1;
            progress.chunk_sent(summary.bytes, image.len());
        }

        self.send_end()?;
        Ok(summary)
    }

    /// Throw away whatever input is ready, for at most `limit`.
    pub fn drain(&mut self, limit: Duration) -> Result<usize, BootloaderError<P::Error>> {
        Ok(self.link.drain_raw(limit)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::Encoder;
    use crate::testing::{ManualClock, MockPort, Recorder};
    use crate::Mode;

    use quickcheck_macros::quickcheck;

    fn frame(typ: u8, payload: &[u8]) -> Vec<u8> {
        Encoder::new().encode(typ, payload).unwrap().to_vec()
    }

    fn chunk_bytes(chunk: u32, data: &[u8]) -> Vec<u8> {
        let mut ser = SerializerArray::<CHUNK_FRAME_MAX>::new();
        write_chunk(&mut ser, chunk, data).unwrap();
        ser.to_vec()
    }

    fn paused_link(port: MockPort, clock: &ManualClock) -> Link<MockPort, &ManualClock> {
        let mut link = Link::new(port, clock);
        link.pause();
        link
    }

    #[test]
    fn chunk_layout() {
        assert_eq!(
            chunk_bytes(0, &[0x10, 0x20, 0x30]),
            vec![0x55, 0xaa, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x10, 0x20, 0x30, 0x00]
        );
        assert_eq!(
            chunk_bytes(END_CHUNK, &END_DATA),
            vec![0x55, 0xaa, 0xff, 0xff, 0xff, 0xff, 0x02, 0x00, 0xaa, 0x55, 0xff]
        );
    }

    #[quickcheck]
    fn chunk_checksum_covers_data(chunk: u32, data: Vec<u8>) -> bool {
        let data = &data[..data.len().min(MAX_CHUNK_LEN)];
        let bytes = chunk_bytes(chunk, data);
        let xor = data.iter().fold(0, |acc, b| acc ^ b);
        bytes.len() == 9 + data.len()
            && bytes[2..6] == chunk.to_le_bytes()
            && bytes[8..8 + data.len()] == *data
            && bytes[bytes.len() - 1] == xor
    }

    #[test]
    fn matcher_overlap() {
        let mut matcher = AckMatcher::new();
        let found: Vec<bool> = [0xb0, 0xb0, 0x07, 0xac, 0x4b]
            .iter()
            .map(|b| matcher.push(*b))
            .collect();
        assert_eq!(found, vec![false, false, false, false, true]);
    }

    #[test]
    fn matcher_restarts() {
        let mut matcher = AckMatcher::new();
        for b in [0xb0, 0x07, 0x00, 0xac, 0x4b] {
            assert!(!matcher.push(b));
        }
        for b in [0xb0, 0x07, 0xb0, 0x07, 0xac] {
            assert!(!matcher.push(b));
        }
        assert!(matcher.push(0x4b));
        // and again, from scratch
        assert!(!matcher.push(0x4b));
    }

    #[test]
    fn retry_backoff_doubles() {
        let config = FlashConfig::default();
        let delays: Vec<u64> = (0..7).map(|n| config.retry_backoff(n).ticks()).collect();
        assert_eq!(delays, vec![0, 200, 400, 800, 1600, 2000, 2000]);
        assert_eq!(config.retry_backoff(100).ticks(), 2000);
    }

    #[test]
    fn needs_paused_link() {
        let clock = ManualClock::new();
        let mut link = Link::new(MockPort::new(), &clock);
        assert!(matches!(link.bootloader(), Err(BootloaderError::WrongMode)));

        link.pause();
        let session = link.bootloader().unwrap();
        drop(session);
        assert_eq!(link.mode(), Mode::Framed);
    }

    #[test]
    fn oversized_chunk_writes_nothing() {
        let clock = ManualClock::new();
        let mut link = paused_link(MockPort::new(), &clock);
        let mut session = link.bootloader().unwrap();

        assert_eq!(
            session.stream_chunk(0, &[0; MAX_CHUNK_LEN + 1]),
            Err(BootloaderError::ChunkTooLarge {
                len: MAX_CHUNK_LEN + 1,
                max: MAX_CHUNK_LEN
            })
        );
        assert_eq!(session.stream_chunk(1, &[0; MAX_CHUNK_LEN]), Ok(MAX_CHUNK_LEN));
        drop(session);
        assert_eq!(link.port().tx.len(), 9 + MAX_CHUNK_LEN);
    }

    #[test]
    fn short_chunk_write() {
        let clock = ManualClock::new();
        let mut port = MockPort::new();
        port.write_budget = Some(5);
        let mut link = paused_link(port, &clock);
        let mut session = link.bootloader().unwrap();

        assert_eq!(
            session.stream_chunk(0, &[1, 2, 3]),
            Err(BootloaderError::ShortWrite)
        );
    }

    #[test]
    fn ack_found_in_noise() {
        let clock = ManualClock::new();
        let port = MockPort::with_rx(&[0x12, 0xb0, 0xb0, 0x07, 0xac, 0x4b, 0x99]);
        let mut link = paused_link(port, &clock);
        let mut session = link.bootloader().unwrap();

        session.wait_for_ack(Duration::millis(100)).unwrap();
        drop(session);
        // nothing past the pattern is consumed
        assert_eq!(link.port().rx, [0x99]);
    }

    #[test]
    fn ack_timeout() {
        let clock = ManualClock::new();
        let port = MockPort::with_rx(&[0xb0, 0x07, 0xac]);
        let mut link = paused_link(port, &clock);
        let mut session = link.bootloader().unwrap();

        assert_eq!(
            session.wait_for_ack(Duration::millis(250)),
            Err(BootloaderError::AckTimeout)
        );
        assert_eq!(clock.now().ticks(), 250);
    }

    #[test]
    fn streams_whole_image() {
        let clock = ManualClock::new();
        let mut port = MockPort::new();
        port.reply_with(&[CHUNK_OK]);
        // stray output before the progress byte is skipped
        port.reply_with(&[0x41, 0x42, CHUNK_OK]);
        port.reply_with(&[CHUNK_OK]);
        let mut link = paused_link(port, &clock);

        let image: Vec<u8> = (0..450).map(|n| n as u8).collect();
        let mut seen = Vec::new();
        struct Seen<'a>(&'a mut Vec<(usize, usize)>);
        impl Progress for Seen<'_> {
            fn chunk_sent(&mut self, sent: usize, total: usize) {
                self.0.push((sent, total));
            }
        }

        let mut session = link.bootloader().unwrap();
        let summary = session
            .stream_firmware(&image, &FlashConfig::default(), Seen(&mut seen))
            .unwrap();
        session.finish();

        assert_eq!(
            summary,
            FlashSummary {
                chunks: 3,
                bytes: 450
            }
        );
        assert_eq!(seen, vec![(200, 450), (400, 450), (450, 450)]);

        let mut expected = chunk_bytes(0, &image[..200]);
        expected.extend(chunk_bytes(1, &image[200..400]));
        expected.extend(chunk_bytes(2, &image[400..]));
        expected.extend(chunk_bytes(END_CHUNK, &END_DATA));
        assert_eq!(link.port().tx, expected);
        assert_eq!(link.mode(), Mode::Framed);
    }

    #[test]
    fn peer_error_aborts() {
        let clock = ManualClock::new();
        let mut port = MockPort::new();
        port.reply_with(&[CHUNK_OK]);
        port.reply_with(&[CHUNK_ERROR, 0x03]);
        let mut link = paused_link(port, &clock);
        let mut session = link.bootloader().unwrap();

        let config = FlashConfig {
            chunk_size: 10,
            ..Default::default()
        };
        assert_eq!(
            session.stream_firmware(&[0; 30], &config, ()),
            Err(BootloaderError::PeerError {
                chunk: 1,
                code: 0x03
            })
        );
        drop(session);
        // two chunks, no end marker
        assert_eq!(link.port().tx.len(), 2 * (9 + 10));
    }

    #[test]
    fn silent_peer_times_out() {
        let clock = ManualClock::new();
        let mut link = paused_link(MockPort::new(), &clock);
        let mut session = link.bootloader().unwrap();

        assert_eq!(
            session.stream_firmware(&[1, 2, 3], &FlashConfig::default(), ()),
            Err(BootloaderError::ChunkAckTimeout { chunk: 0 })
        );
        assert_eq!(clock.now().ticks(), 2000);
    }

    #[test]
    fn bad_chunk_size() {
        let clock = ManualClock::new();
        let mut link = paused_link(MockPort::new(), &clock);
        let mut session = link.bootloader().unwrap();
        let config = FlashConfig {
            chunk_size: MAX_CHUNK_LEN + 1,
            ..Default::default()
        };

        assert_eq!(
            session.stream_firmware(&[1, 2, 3], &config, ()),
            Err(BootloaderError::InvalidChunkSize)
        );
        drop(session);
        assert!(link.port().tx.is_empty());
    }

    #[test]
    fn entry_retries_until_ready() {
        let clock = ManualClock::new();
        let mut port = MockPort::new();
        // first attempt: only log chatter
        port.reply_with(&frame(0x25, b"going down"));
        // second attempt: the magic, then leftovers
        let mut ready = frame(0x25, b"bye");
        ready.extend(BOOTLOADER_ACK);
        ready.extend([0x00, 0x01, 0x02]);
        port.reply_with(&ready);
        let mut link = Link::new(port, &clock);

        let session = link.enter_bootloader_mode(&FlashConfig::default()).unwrap();
        assert!(session.link().is_paused());
        assert!(session.link().port().rx.is_empty());
        drop(session);

        let mut encoder = Encoder::new();
        let mut expected = encoder.encode(0x1f, &[]).unwrap().to_vec();
        expected.extend_from_slice(&encoder.encode(0x1f, &[]).unwrap());
        assert_eq!(link.port().tx, expected);
        // one full wait, one backoff, one settle
        assert_eq!(clock.now().ticks(), 5000 + 200 + 150);
    }

    #[test]
    fn entry_gives_up() {
        let clock = ManualClock::new();
        let mut link = Link::new(MockPort::new(), &clock);
        let config = FlashConfig {
            entry_attempts: 3,
            ready_timeout: Duration::millis(10),
            ..Default::default()
        };

        assert!(matches!(
            link.enter_bootloader_mode(&config),
            Err(BootloaderError::AckTimeout)
        ));
        assert!(!link.is_paused());
        assert_eq!(link.port().flushes, 3);
        assert_eq!(clock.now().ticks(), 3 * 10 + 200 + 400);
    }

    #[test]
    fn entry_respects_backoff() {
        let clock = ManualClock::new();
        let nack = frame(0x0d, &[0x1f, 0x00, 0x05, 0x00]);
        let mut link = Link::new(MockPort::with_rx(&nack), &clock);
        link.poll(&mut Recorder::default()).unwrap();

        let config = FlashConfig {
            entry_attempts: 1,
            ..Default::default()
        };
        assert!(matches!(
            link.enter_bootloader_mode(&config),
            Err(BootloaderError::CommandFailed)
        ));
        assert!(link.port().tx.is_empty());
        assert!(!link.is_paused());
    }
}
