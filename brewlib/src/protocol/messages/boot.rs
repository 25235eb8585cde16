use nom::combinator::opt;
use nom::number::complete::{le_u32, u8 as byte};

use super::{util, Message, MessageParse, MessageSerialize, MessageType, Serializer};

/// Length of the build date field, e.g. `Jan 15 2026`.
pub const BUILD_DATE_LEN: usize = 11;

/// Length of the build time field, `HHMMSS`.
pub const BUILD_TIME_LEN: usize = 6;

/// Machine layouts the peer firmware knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MachineType {
    Unknown = 0x00,
    DualBoiler = 0x01,
    SingleBoiler = 0x02,
    HeatExchanger = 0x03,
    Thermoblock = 0x04,
}

impl MachineType {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => Self::Unknown,
            0x01 => Self::DualBoiler,
            0x02 => Self::SingleBoiler,
            0x03 => Self::HeatExchanger,
            0x04 => Self::Thermoblock,
            _ => return None,
        })
    }
}

impl core::fmt::Display for MachineType {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::DualBoiler => "dual boiler",
            Self::SingleBoiler => "single boiler",
            Self::HeatExchanger => "heat exchanger",
            Self::Thermoblock => "thermoblock",
        };
        f.write_str(s)
    }
}

/// Which board the peer is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pcb {
    pub pcb_type: u8,
    pub version_major: u8,
    pub version_minor: u8,
}

/// Build time as sent by the peer, `HHMMSS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BuildTime(pub [u8; BUILD_TIME_LEN]);

impl core::fmt::Display for BuildTime {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if self.0.iter().all(u8::is_ascii_digit) {
            let [h1, h0, m1, m0, s1, s0] = self.0.map(char::from);
            write!(f, "{}{}:{}{}:{}{}", h1, h0, m1, m0, s1, s0)
        } else {
            f.write_str(util::ascii_field(&self.0).unwrap_or("?"))
        }
    }
}

/// 0x03 Boot, sent by the peer whenever it starts, and on request.
///
/// Only the version and machine type are required. Older peers stop
/// after any of the later fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Boot {
    pub version_major: u8,
    pub version_minor: u8,
    pub version_patch: u8,
    /// Raw machine type, see [MachineType].
    pub machine_type: u8,
    pub pcb: Option<Pcb>,
    /// Raw reset cause register from the peer.
    pub reset_reason: Option<u32>,
    pub build_date: Option<[u8; BUILD_DATE_LEN]>,
    pub build_time: Option<BuildTime>,
}

impl Boot {
    /// The peer firmware version, formatted the way the host's is.
    pub fn version(&self) -> crate::Version {
        crate::Version::from_triple(self.version_major, self.version_minor, self.version_patch)
    }

    pub fn machine_type(&self) -> Option<MachineType> {
        MachineType::from_code(self.machine_type)
    }

    pub fn build_date(&self) -> Option<&str> {
        self.build_date.as_ref().and_then(|d| util::ascii_field(d))
    }
}

impl Message for Boot {
    const TYPE: MessageType = MessageType::Boot;
}

impl MessageParse for Boot {
    fn parse(input: &[u8]) -> nom::IResult<&[u8], Self> {
        let (input, (version_major, version_minor, version_patch, machine_type)) =
            nom::sequence::tuple((byte, byte, byte, byte))(input)?;

        let (input, pcb) = opt(nom::sequence::tuple((byte, byte, byte)))(input)?;
        let pcb = pcb.map(|(pcb_type, version_major, version_minor)| Pcb {
            pcb_type,
            version_major,
            version_minor,
        });

        let (input, reset_reason) = opt(le_u32)(input)?;
        let (input, build_date) = opt(util::parse_array::<BUILD_DATE_LEN>)(input)?;
        let (input, build_time) = opt(util::parse_array::<BUILD_TIME_LEN>)(input)?;

        Ok((
            input,
            Boot {
                version_major,
                version_minor,
                version_patch,
                machine_type,
                pcb,
                reset_reason,
                build_date,
                build_time: build_time.map(BuildTime),
            },
        ))
    }
}

impl MessageSerialize for Boot {
    /// Optional fields are written up to the first missing one.
    fn serialize<S>(&self, ser: &mut S) -> Result<(), S::Error>
    where
        S: Serializer,
    {
        ser.write_bytes(&[
            self.version_major,
            self.version_minor,
            self.version_patch,
            self.machine_type,
        ])?;

        let Some(pcb) = self.pcb else {
            return Ok(());
        };
        ser.write_bytes(&[pcb.pcb_type, pcb.version_major, pcb.version_minor])?;

        let Some(reset_reason) = self.reset_reason else {
            return Ok(());
        };
        ser.write_le_u32(reset_reason)?;

        let Some(build_date) = self.build_date else {
            return Ok(());
        };
        ser.write_bytes(&build_date)?;

        if let Some(BuildTime(build_time)) = self.build_time {
            ser.write_bytes(&build_time)?;
        }
        Ok(())
    }
}

impl core::fmt::Display for Boot {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "v{}", self.version())?;
        match self.machine_type() {
            Some(typ) => write!(f, ", {}", typ)?,
            None => write!(f, ", machine type 0x{:02x}", self.machine_type)?,
        }
        if let Some(pcb) = self.pcb {
            write!(
                f,
                ", pcb {} v{}.{}",
                pcb.pcb_type, pcb.version_major, pcb.version_minor
            )?;
        }
        if let Some(reset_reason) = self.reset_reason {
            write!(f, ", reset reason 0x{:x}", reset_reason)?;
        }
        if let Some(date) = self.build_date() {
            write!(f, ", built {}", date)?;
            if let Some(time) = self.build_time {
                write!(f, " {}", time)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::serialize::SerializerArray;

    const FULL: [u8; 28] = [
        0x00, 0x04, 0x04, 0x01, 0x02, 0x01, 0x03, 0x01, 0x00, 0x00, 0x00, b'J', b'a', b'n', b' ',
        b'1', b'5', b' ', b'2', b'0', b'2', b'6', b'1', b'2', b'3', b'4', b'5', b'6',
    ];

    #[test]
    fn full_payload() {
        let boot = Boot::from_payload(&FULL).unwrap();
        assert_eq!(boot.version().as_str(), Ok("0.4.4"));
        assert_eq!(boot.machine_type(), Some(MachineType::DualBoiler));
        assert_eq!(
            boot.pcb,
            Some(Pcb {
                pcb_type: 2,
                version_major: 1,
                version_minor: 3
            })
        );
        assert_eq!(boot.reset_reason, Some(1));
        assert_eq!(boot.build_date(), Some("Jan 15 2026"));
        assert_eq!(
            boot.to_string(),
            "v0.4.4, dual boiler, pcb 2 v1.3, reset reason 0x1, built Jan 15 2026 12:34:56"
        );
    }

    #[test]
    fn minimal_payload() {
        let boot = Boot::from_payload(&FULL[..4]).unwrap();
        assert_eq!(boot.version().as_str(), Ok("0.4.4"));
        assert_eq!(boot.pcb, None);
        assert_eq!(boot.reset_reason, None);
        assert_eq!(boot.build_time, None);
        assert_eq!(boot.to_string(), "v0.4.4, dual boiler");
    }

    #[test]
    fn without_build_stamp() {
        let boot = Boot::from_payload(&FULL[..11]).unwrap();
        assert_eq!(boot.reset_reason, Some(1));
        assert_eq!(boot.build_date, None);
    }

    #[test]
    fn too_short() {
        assert_eq!(Boot::from_payload(&FULL[..3]), None);
    }

    #[test]
    fn serialize_full() {
        let boot = Boot::from_payload(&FULL).unwrap();
        let mut ser = SerializerArray::<32>::new();
        boot.serialize(&mut ser).unwrap();
        assert_eq!(ser.as_bytes(), &FULL[..]);
    }

    #[test]
    fn odd_build_time() {
        assert_eq!(BuildTime(*b"12:34\0").to_string(), "12:34");
    }
}
