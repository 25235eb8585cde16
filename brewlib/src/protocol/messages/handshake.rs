use nom::number::complete::{le_u16, u8 as byte};

use super::{Message, MessageParse, MessageSerialize, MessageType, Serializer};

/// 0x0C Handshake, sent by either side to agree on protocol details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Handshake {
    pub protocol_major: u8,
    pub protocol_minor: u8,
    /// Capability flags. No flags are defined yet.
    pub capabilities: u8,
    /// How many times a command may be retried.
    pub max_retry_count: u8,
    /// How long to wait for a command acknowledgment.
    pub ack_timeout_ms: u16,
}

impl Handshake {
    /// What this host always answers with, whatever the peer sent.
    pub const HOST: Handshake = Handshake {
        protocol_major: 1,
        protocol_minor: 1,
        capabilities: 0,
        max_retry_count: 3,
        ack_timeout_ms: 1000,
    };

    /// Size of the payload on the wire.
    pub const LEN: usize = 6;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let [timeout_lo, timeout_hi] = self.ack_timeout_ms.to_le_bytes();
        [
            self.protocol_major,
            self.protocol_minor,
            self.capabilities,
            self.max_retry_count,
            timeout_lo,
            timeout_hi,
        ]
    }
}

impl Message for Handshake {
    const TYPE: MessageType = MessageType::Handshake;
}

impl MessageParse for Handshake {
    fn parse(input: &[u8]) -> nom::IResult<&[u8], Self> {
        let (input, (protocol_major, protocol_minor, capabilities, max_retry_count)) =
            nom::sequence::tuple((byte, byte, byte, byte))(input)?;
        let (input, ack_timeout_ms) = le_u16(input)?;

        Ok((
            input,
            Handshake {
                protocol_major,
                protocol_minor,
                capabilities,
                max_retry_count,
                ack_timeout_ms,
            },
        ))
    }
}

impl MessageSerialize for Handshake {
    fn serialize<S>(&self, ser: &mut S) -> Result<(), S::Error>
    where
        S: Serializer,
    {
        ser.write_bytes(&self.to_bytes())
    }
}

impl core::fmt::Display for Handshake {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "protocol v{}.{}, caps 0x{:02x}, max retries {}, ack timeout {} ms",
            self.protocol_major,
            self.protocol_minor,
            self.capabilities,
            self.max_retry_count,
            self.ack_timeout_ms
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn host_bytes() {
        assert_eq!(
            Handshake::HOST.to_bytes(),
            [0x01, 0x01, 0x00, 0x03, 0xe8, 0x03]
        );
    }

    #[test]
    fn parse() {
        let hs = Handshake::from_payload(&[0x02, 0x00, 0x01, 0x05, 0xd0, 0x07]).unwrap();
        assert_eq!(hs.protocol_major, 2);
        assert_eq!(hs.protocol_minor, 0);
        assert_eq!(hs.capabilities, 1);
        assert_eq!(hs.max_retry_count, 5);
        assert_eq!(hs.ack_timeout_ms, 2000);
    }

    #[test]
    fn short_payload() {
        assert_eq!(Handshake::from_payload(&[0x01, 0x01, 0x00, 0x03, 0xe8]), None);
    }

    #[quickcheck_macros::quickcheck]
    fn bytes_parse(major: u8, minor: u8, caps: u8, retries: u8, timeout: u16) -> bool {
        let hs = Handshake {
            protocol_major: major,
            protocol_minor: minor,
            capabilities: caps,
            max_retry_count: retries,
            ack_timeout_ms: timeout,
        };
        Handshake::from_payload(&hs.to_bytes()) == Some(hs)
    }
}
