use embedded_io::{Read, ReadReady, Write};

use crate::backoff::{Backoff, BackoffConfig};
use crate::event::{Event, Handler};
use crate::liveness::Liveness;
use crate::protocol::messages::{Boot, Handshake, MessageParse, MessageSerialize, Nack};
use crate::protocol::serialize::{SerializerArray, SerializerLength};
use crate::protocol::{Decoded, Decoder, Encoder, FrameError, MessageType, Packet, MAX_PAYLOAD};
use crate::time::{Clock, Duration};
use crate::Version;

/// An error type for [Link].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError<E> {
    /// Error in the underlying port.
    Io(E),
    /// The frame could not be built.
    Frame(FrameError),
    /// The port stopped accepting bytes partway through a frame.
    ShortWrite,
    /// Framed traffic is paused while the bootloader owns the port.
    WrongMode,
}

#[cfg(feature = "std")]
impl<E> std::error::Error for LinkError<E> where E: core::fmt::Debug {}

impl<E> core::fmt::Display for LinkError<E>
where
    E: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {:?}", e),
            Self::Frame(e) => write!(f, "{}", e),
            Self::ShortWrite => write!(f, "short write"),
            Self::WrongMode => write!(f, "link is paused for the bootloader"),
        }
    }
}

impl<E> From<E> for LinkError<E> {
    fn from(other: E) -> Self {
        Self::Io(other)
    }
}

/// Who owns the byte stream right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Normal framed packets.
    Framed,
    /// The frame decoder is paused and the bootloader transport has
    /// the port to itself.
    BootloaderRaw,
}

/// Tuning for [Link].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    /// The peer counts as gone after this long without a valid packet.
    pub connection_timeout: Duration,
    pub backoff: BackoffConfig,
    /// Compared against the version in the peer's boot packet.
    pub host_version: Version,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Liveness::DEFAULT_TIMEOUT,
            backoff: BackoffConfig::default(),
            host_version: crate::HOST_VERSION,
        }
    }
}

/// Bytes read from the port per call while polling.
const READ_CHUNK: usize = 64;

/// The host end of the link to the peer.
///
/// Owns the port, the frame decoder and encoder, and all the state
/// that goes with them. Drive it by calling [Link::poll] often.
#[derive(Debug)]
pub struct Link<P, C> {
    pub(crate) port: P,
    pub(crate) clock: C,
    config: LinkConfig,
    mode: Mode,
    decoder: Decoder,
    encoder: Encoder,
    backoff: Backoff,
    liveness: Liveness,
    connected: bool,
}

impl<P, C> Link<P, C> {
    /// Create a new link with the default [LinkConfig].
    pub fn new(port: P, clock: C) -> Self {
        Self::new_with(LinkConfig::default(), port, clock)
    }

    /// Create a new link with the provided configuration.
    pub fn new_with(config: LinkConfig, port: P, clock: C) -> Self {
        Self {
            port,
            clock,
            config,
            mode: Mode::Framed,
            decoder: Decoder::new(),
            encoder: Encoder::new(),
            backoff: Backoff::new(config.backoff),
            liveness: Liveness::new(config.connection_timeout),
            connected: false,
        }
    }

    /// Release the components used to create this link.
    pub fn free(self) -> (P, C) {
        (self.port, self.clock)
    }

    /// Get the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get the underlying port, mutably.
    ///
    /// Reading from this will steal bytes from the decoder.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_paused(&self) -> bool {
        self.mode == Mode::BootloaderRaw
    }

    /// Stop decoding frames and hand the port to the bootloader
    /// transport.
    pub fn pause(&mut self) {
        self.mode = Mode::BootloaderRaw;
    }

    /// Go back to framed packets. Any half-decoded frame from before
    /// the pause is dropped.
    pub fn resume(&mut self) {
        self.decoder.reset();
        self.mode = Mode::Framed;
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn packets_received(&self) -> u32 {
        self.decoder.packets_received()
    }

    pub fn packet_errors(&self) -> u32 {
        self.decoder.packet_errors()
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Forget when the peer last spoke. It reads as disconnected until
    /// the next valid packet.
    pub fn clear_connection_state(&mut self) {
        self.liveness.clear();
    }

    pub fn is_connected(&self) -> bool
    where
        C: Clock,
    {
        self.liveness.is_connected(self.clock.now())
    }

    /// Read and dispatch every byte the port has ready. Never waits for
    /// more. Does nothing while paused.
    ///
    /// If a reply to the peer cannot be written, the rest of the bytes
    /// already read are still dispatched before the error is returned.
    pub fn poll<H>(&mut self, handler: &mut H) -> Result<(), LinkError<P::Error>>
    where
        P: Read + ReadReady + Write,
        C: Clock,
        H: Handler + ?Sized,
    {
        if self.is_paused() {
            return Ok(());
        }

        let mut buf = [0; READ_CHUNK];
        let mut failed = None;
        while failed.is_none() && self.port.read_ready()? {
            let amt = self.port.read(&mut buf)?;
            if amt == 0 {
                break;
            }
            for byte in buf[..amt].iter() {
                if let Some(decoded) = self.decoder.push(*byte) {
                    if let Err(e) = self.handle_decoded(decoded, handler) {
                        failed.get_or_insert(e);
                    }
                }
            }
        }

        self.update_connection(handler);
        match failed {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn handle_decoded<H>(
        &mut self,
        decoded: Decoded,
        handler: &mut H,
    ) -> Result<(), LinkError<P::Error>>
    where
        P: Write,
        C: Clock,
        H: Handler + ?Sized,
    {
        match decoded {
            Decoded::Packet(packet) => {
                self.liveness.record(self.clock.now());
                self.dispatch(&packet, handler)?;
            }
            Decoded::CrcError { received, expected } => {
                handler.event(Event::CrcMismatch { received, expected })
            }
            Decoded::Overflow => handler.event(Event::Overflow),
        }
        Ok(())
    }

    /// Route a validated packet. Boot, handshake and NACK packets are
    /// handled here, other inbound types go to `handler`, and anything
    /// else is dropped.
    pub fn dispatch<H>(&mut self, packet: &Packet, handler: &mut H) -> Result<(), LinkError<P::Error>>
    where
        P: Write,
        C: Clock,
        H: Handler + ?Sized,
    {
        match packet.message_type() {
            Some(MessageType::Boot) => self.handle_boot(packet, handler),
            Some(MessageType::Handshake) => self.handle_handshake(packet, handler)?,
            Some(MessageType::Nack) => self.handle_nack(packet, handler),
            Some(typ) if typ.is_inbound() => handler.packet(packet),
            _ => {}
        }
        Ok(())
    }

    fn handle_boot<H>(&mut self, packet: &Packet, handler: &mut H)
    where
        H: Handler + ?Sized,
    {
        let boot = Boot::from_payload(packet.payload());
        handler.event(Event::PeerBooted(boot));

        if let Some(boot) = boot {
            let peer = boot.version();
            if peer != self.config.host_version {
                handler.event(Event::VersionMismatch {
                    host: self.config.host_version,
                    peer,
                });
            }
        }

        handler.packet(packet);
    }

    fn handle_handshake<H>(
        &mut self,
        packet: &Packet,
        handler: &mut H,
    ) -> Result<(), LinkError<P::Error>>
    where
        P: Write,
        H: Handler + ?Sized,
    {
        let Some(handshake) = Handshake::from_payload(packet.payload()) else {
            return Ok(());
        };

        handler.event(Event::Handshake(handshake));
        self.send_handshake()
    }

    fn handle_nack<H>(&mut self, packet: &Packet, handler: &mut H)
    where
        C: Clock,
        H: Handler + ?Sized,
    {
        let Some(nack) = Nack::from_payload(packet.payload()) else {
            return;
        };

        let update = self.backoff.on_nack(self.clock.now());
        handler.event(Event::Nack {
            nack,
            backoff: update.backoff,
        });
        if update.overloaded {
            handler.event(Event::Overload {
                threshold: self.backoff.config().overload_threshold,
            });
        }
    }

    fn update_connection<H>(&mut self, handler: &mut H)
    where
        C: Clock,
        H: Handler + ?Sized,
    {
        let connected = self.liveness.is_connected(self.clock.now());
        if connected != self.connected {
            self.connected = connected;
            handler.event(if connected {
                Event::Connected
            } else {
                Event::Disconnected
            });
        }
    }

    /// Encode and write one frame, ignoring any backoff.
    pub fn send_packet(&mut self, typ: u8, payload: &[u8]) -> Result<(), LinkError<P::Error>>
    where
        P: Write,
    {
        if self.is_paused() {
            return Err(LinkError::WrongMode);
        }

        let frame = self.encoder.encode(typ, payload).map_err(LinkError::Frame)?;
        if !write_fully(&mut self.port, &frame)? {
            return Err(LinkError::ShortWrite);
        }
        self.port.flush()?;
        Ok(())
    }

    /// Serialize a message and send it, ignoring any backoff.
    pub fn send_message<M>(&mut self, msg: &M) -> Result<(), LinkError<P::Error>>
    where
        P: Write,
        M: MessageSerialize,
    {
        let mut len = SerializerLength::new();
        msg.serialize(&mut len).unwrap_or_else(|e| match e {});
        let too_large = LinkError::Frame(FrameError::PayloadTooLarge {
            len: len.len(),
            max: MAX_PAYLOAD,
        });
        if len.len() > MAX_PAYLOAD {
            return Err(too_large);
        }

        let mut payload = SerializerArray::<MAX_PAYLOAD>::new();
        msg.serialize(&mut payload).map_err(|_| too_large)?;
        self.send_packet(M::TYPE.code(), &payload)
    }

    /// Send a command, unless the peer has recently asked us to back
    /// off. In that case nothing is written and this returns
    /// [nb::Error::WouldBlock]; try again later.
    pub fn send_command(&mut self, typ: u8, payload: &[u8]) -> nb::Result<(), LinkError<P::Error>>
    where
        P: Write,
        C: Clock,
    {
        if self.backoff.remaining(self.clock.now()).is_some() {
            return Err(nb::Error::WouldBlock);
        }
        self.send_packet(typ, payload).map_err(nb::Error::Other)
    }

    /// Send a ping carrying the current time.
    pub fn send_ping(&mut self) -> Result<(), LinkError<P::Error>>
    where
        P: Write,
        C: Clock,
    {
        // the peer only echoes it, so wrapping is fine
        let timestamp = self.clock.now().ticks() as u32;
        self.send_packet(MessageType::Ping.code(), &timestamp.to_le_bytes())
    }

    /// Ask the peer for its configuration.
    pub fn request_config(&mut self) -> Result<(), LinkError<P::Error>>
    where
        P: Write,
    {
        self.send_packet(MessageType::CmdGetConfig.code(), &[])
    }

    /// Ask the peer to send its boot packet again.
    pub fn request_boot_info(&mut self) -> Result<(), LinkError<P::Error>>
    where
        P: Write,
    {
        self.send_packet(MessageType::CmdGetBoot.code(), &[])
    }

    /// Send this host's handshake.
    pub fn send_handshake(&mut self) -> Result<(), LinkError<P::Error>>
    where
        P: Write,
    {
        self.send_message(&Handshake::HOST)
    }

    /// Ask the peer to reboot into its bootloader. Subject to backoff.
    pub fn enter_bootloader(&mut self) -> nb::Result<(), LinkError<P::Error>>
    where
        P: Write,
        C: Clock,
    {
        self.send_command(MessageType::CmdBootloader.code(), &[])
    }
}

/// Write all of `data`. Returns `false` if the port stopped taking
/// bytes before the end.
pub(crate) fn write_fully<W>(port: &mut W, mut data: &[u8]) -> Result<bool, W::Error>
where
    W: Write,
{
    while !data.is_empty() {
        let amt = port.write(data)?;
        if amt == 0 {
            return Ok(false);
        }
        data = &data[amt..];
    }
    Ok(true)
}
