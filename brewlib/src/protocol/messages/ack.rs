use nom::number::complete::u8 as byte;

use super::{Message, MessageParse, MessageSerialize, MessageType, Serializer};

/// Result codes carried in [Ack] and [Nack].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AckResult {
    Success = 0x00,
    Invalid = 0x01,
    Rejected = 0x02,
    Failed = 0x03,
    Timeout = 0x04,
    Busy = 0x05,
    NotReady = 0x06,
}

impl AckResult {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::Success,
            0x01 => Self::Invalid,
            0x02 => Self::Rejected,
            0x03 => Self::Failed,
            0x04 => Self::Timeout,
            0x05 => Self::Busy,
            0x06 => Self::NotReady,
            _ => return None,
        })
    }
}

impl core::fmt::Display for AckResult {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Invalid => "invalid",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Busy => "busy",
            Self::NotReady => "not ready",
        };
        f.write_str(s)
    }
}

/// The peer's answer to a command: which one, and how it went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandReply {
    /// Type code of the command being answered.
    pub cmd_type: u8,
    /// Sequence number of the command being answered.
    pub cmd_seq: u8,
    /// Raw result code, see [AckResult].
    pub result: u8,
    pub reserved: u8,
}

impl CommandReply {
    pub fn result(&self) -> Option<AckResult> {
        AckResult::from_code(self.result)
    }

    fn parse(input: &[u8]) -> nom::IResult<&[u8], Self> {
        let (input, (cmd_type, cmd_seq, result, reserved)) =
            nom::sequence::tuple((byte, byte, byte, byte))(input)?;
        Ok((
            input,
            Self {
                cmd_type,
                cmd_seq,
                result,
                reserved,
            },
        ))
    }

    fn serialize<S>(&self, ser: &mut S) -> Result<(), S::Error>
    where
        S: Serializer,
    {
        ser.write_bytes(&[self.cmd_type, self.cmd_seq, self.result, self.reserved])
    }
}

impl core::fmt::Display for CommandReply {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match MessageType::from_code(self.cmd_type) {
            Some(typ) => write!(f, "{}", typ)?,
            None => write!(f, "0x{:02x}", self.cmd_type)?,
        }
        write!(f, " seq {}: ", self.cmd_seq)?;
        match self.result() {
            Some(result) => write!(f, "{}", result),
            None => write!(f, "result 0x{:02x}", self.result),
        }
    }
}

macro_rules! reply_message {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(pub CommandReply);

        impl Message for $name {
            const TYPE: MessageType = MessageType::$name;
        }

        impl MessageParse for $name {
            fn parse(input: &[u8]) -> nom::IResult<&[u8], Self> {
                let (input, reply) = CommandReply::parse(input)?;
                Ok((input, Self(reply)))
            }
        }

        impl MessageSerialize for $name {
            fn serialize<S>(&self, ser: &mut S) -> Result<(), S::Error>
            where
                S: Serializer,
            {
                self.0.serialize(ser)
            }
        }

        impl core::ops::Deref for $name {
            type Target = CommandReply;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

reply_message! {
    /// 0x04 Ack, the peer accepted (or finished) a command.
    Ack
}

reply_message! {
    /// 0x0D Nack, the peer could not take a command. Drives the
    /// host's backoff.
    Nack
}
