//! What the link reports back to its owner.

use crate::protocol::messages::{Boot, Handshake, Nack};
use crate::protocol::Packet;
use crate::time::Duration;
use crate::Version;

/// How loudly an [Event] should be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

/// Something log-worthy happened on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The first valid packet after a silence.
    Connected,
    /// No valid packet within the connection timeout.
    Disconnected,
    /// A frame arrived with a bad CRC and was dropped.
    CrcMismatch { received: u16, expected: u16 },
    /// A frame was too long for the decoder and was dropped.
    Overflow,
    /// The peer (re)started. Carries its boot report, if the packet was
    /// long enough to hold one.
    PeerBooted(Option<Boot>),
    /// The peer runs a different firmware version than this host.
    VersionMismatch { host: Version, peer: Version },
    /// The peer sent a handshake, and it was answered.
    Handshake(Handshake),
    /// The peer refused a command. Gated sends are held off for
    /// `backoff`.
    Nack { nack: Nack, backoff: Duration },
    /// More than `threshold` NACKs arrived in one burst.
    Overload { threshold: u32 },
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Self::Connected => Level::Info,
            Self::Disconnected => Level::Warn,
            Self::CrcMismatch { .. } => Level::Warn,
            Self::Overflow => Level::Warn,
            Self::PeerBooted(_) => Level::Info,
            Self::VersionMismatch { .. } => Level::Warn,
            Self::Handshake(_) => Level::Info,
            Self::Nack { .. } => Level::Warn,
            Self::Overload { .. } => Level::Error,
        }
    }
}

impl core::fmt::Display for Event {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Connected => write!(f, "peer connected"),
            Self::Disconnected => write!(f, "peer connection lost"),
            Self::CrcMismatch { received, expected } => write!(
                f,
                "crc mismatch: received 0x{:04x}, expected 0x{:04x}",
                received, expected
            ),
            Self::Overflow => write!(f, "frame overflowed receive buffer"),
            Self::PeerBooted(Some(boot)) => write!(f, "peer booted: {}", boot),
            Self::PeerBooted(None) => write!(f, "peer booted"),
            Self::VersionMismatch { host, peer } => {
                write!(f, "version mismatch: host {}, peer {}", host, peer)
            }
            Self::Handshake(hs) => write!(f, "handshake from peer: {}", hs),
            Self::Nack { nack, backoff } => {
                write!(f, "nack for {}, backing off {} ms", nack, backoff.ticks())
            }
            Self::Overload { threshold } => {
                write!(f, "peer overloaded: more than {} nacks in a row", threshold)
            }
        }
    }
}

/// Receiver for everything the link does not handle itself.
///
/// Both methods do nothing by default.
pub trait Handler {
    /// A validated packet of a known inbound type that the link
    /// itself has no use for.
    fn packet(&mut self, packet: &Packet) {
        let _ = packet;
    }

    /// A protocol event worth logging or reacting to.
    fn event(&mut self, event: Event) {
        let _ = event;
    }
}

impl Handler for () {}

impl<H> Handler for &mut H
where
    H: Handler + ?Sized,
{
    fn packet(&mut self, packet: &Packet) {
        (**self).packet(packet)
    }

    fn event(&mut self, event: Event) {
        (**self).event(event)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::messages::CommandReply;

    #[test]
    fn levels() {
        assert_eq!(Event::Connected.level(), Level::Info);
        assert_eq!(Event::Overload { threshold: 10 }.level(), Level::Error);
        assert!(Level::Error < Level::Debug);
    }

    #[test]
    fn display() {
        let event = Event::Nack {
            nack: Nack(CommandReply {
                cmd_type: 0x1f,
                cmd_seq: 3,
                result: 0x05,
                reserved: 0,
            }),
            backoff: Duration::millis(200),
        };
        assert_eq!(
            event.to_string(),
            "nack for CmdBootloader (0x1f) seq 3: busy, backing off 200 ms"
        );
        assert_eq!(
            Event::CrcMismatch {
                received: 0x1234,
                expected: 0xabcd
            }
            .to_string(),
            "crc mismatch: received 0x1234, expected 0xabcd"
        );
    }
}
