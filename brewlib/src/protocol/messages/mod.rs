//! Message type codes and the payloads the link itself understands.

use super::serialize::Serializer;

mod ack;
pub use ack::*;

mod boot;
pub use boot::*;

mod handshake;
pub use handshake::*;

pub mod util;

macro_rules! message_types {
    ($($(#[$meta:meta])* $name:ident = $code:literal, $inbound:literal;)*) => {
        /// Every message type code known to either side of the link.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[repr(u8)]
        pub enum MessageType {
            $($(#[$meta])* $name = $code,)*
        }

        impl MessageType {
            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Whether the peer sends this type to the host.
            pub fn is_inbound(&self) -> bool {
                match self {
                    $(Self::$name => $inbound,)*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }

            /// Look up a type by [MessageType::name], ignoring case.
            pub fn from_name(name: &str) -> Option<Self> {
                $(
                    if name.eq_ignore_ascii_case(stringify!($name)) {
                        return Some(Self::$name);
                    }
                )*
                None
            }
        }
    };
}

message_types! {
    Ping = 0x00, true;
    /// Temperatures, pressure, and machine state.
    Status = 0x01, true;
    Alarm = 0x02, true;
    /// Sent by the peer whenever it starts, and on request.
    Boot = 0x03, true;
    Ack = 0x04, true;
    Config = 0x05, true;
    Debug = 0x06, true;
    DebugResp = 0x07, true;
    EnvConfig = 0x08, true;
    Statistics = 0x09, true;
    Diagnostics = 0x0a, true;
    PowerMeter = 0x0b, true;
    Handshake = 0x0c, true;
    /// The peer could not take a command right now.
    Nack = 0x0d, true;

    CmdSetTemp = 0x10, false;
    CmdSetPid = 0x11, false;
    CmdBrew = 0x13, false;
    CmdMode = 0x14, false;
    CmdConfig = 0x15, false;
    CmdGetConfig = 0x16, false;
    CmdGetEnvConfig = 0x17, false;
    CmdCleaningStart = 0x18, false;
    CmdCleaningStop = 0x19, false;
    CmdCleaningReset = 0x1a, false;
    CmdCleaningSetThreshold = 0x1b, false;
    CmdGetStatistics = 0x1c, false;
    CmdDebug = 0x1d, false;
    CmdSetEco = 0x1e, false;
    /// Ask the peer to reboot into its serial bootloader.
    CmdBootloader = 0x1f, false;
    CmdDiagnostics = 0x20, false;
    CmdPowerMeterConfig = 0x21, false;
    CmdPowerMeterDiscover = 0x22, false;
    CmdGetBoot = 0x23, false;
    CmdLogConfig = 0x24, false;

    /// Forwarded log line from the peer.
    Log = 0x25, true;
}

impl MessageType {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl core::fmt::Display for MessageType {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{} (0x{:02x})", self.name(), self.code())
    }
}

/// A payload with a fixed message type.
pub trait Message {
    const TYPE: MessageType;
}

/// A payload that can be parsed out of a packet.
pub trait MessageParse: Sized + Message {
    fn parse(input: &[u8]) -> nom::IResult<&[u8], Self>;

    /// Parse a whole payload. Trailing bytes are ignored, so newer
    /// peers may append fields.
    fn from_payload(payload: &[u8]) -> Option<Self> {
        Self::parse(payload).ok().map(|(_, msg)| msg)
    }
}

/// A payload that can be written into a frame.
pub trait MessageSerialize: Message {
    /// Serialize just the payload.
    fn serialize<S>(&self, ser: &mut S) -> Result<(), S::Error>
    where
        S: Serializer;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..=u8::MAX {
            if let Some(typ) = MessageType::from_code(code) {
                assert_eq!(typ.code(), code);
            }
        }
    }

    #[test]
    fn direction() {
        assert!(MessageType::Status.is_inbound());
        assert!(MessageType::Log.is_inbound());
        assert!(!MessageType::CmdBootloader.is_inbound());
        assert_eq!(MessageType::from_code(0x12), None);
        assert_eq!(MessageType::from_code(0x26), None);
    }

    #[test]
    fn display() {
        assert_eq!(MessageType::Nack.to_string(), "Nack (0x0d)");
    }

    #[test]
    fn by_name() {
        assert_eq!(MessageType::from_name("CmdBrew"), Some(MessageType::CmdBrew));
        assert_eq!(MessageType::from_name("cmdgetboot"), Some(MessageType::CmdGetBoot));
        assert_eq!(MessageType::from_name("brew"), None);
    }
}
