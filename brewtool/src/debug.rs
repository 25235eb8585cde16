use brewlib::event::{Event, Handler, Level};
use brewlib::protocol::messages::{util, Ack, Boot, Handshake, MessageParse, Nack};
use brewlib::protocol::serialize::{Serializer, SerializerWrap};
use brewlib::protocol::{MessageType, Packet};
use embedded_io_adapters::std::FromStd;

/// Which way bytes were going, as stored in a dump file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Direction {
    FromPeer = 0,
    FromHost = 1,
}

impl Direction {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::FromPeer),
            1 => Some(Self::FromHost),
            _ => None,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Self::FromPeer => "<<<",
            Self::FromHost => ">>>",
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct DebugArgs {
    /// Append all raw traffic to this file, for parse-dump.
    #[arg(long)]
    dump: Option<String>,
}

impl DebugArgs {
    pub fn wrap<P>(&self, port: P) -> anyhow::Result<Tap<P>> {
        let mut dump = None;
        if let Some(ref path) = self.dump {
            dump = Some(SerializerWrap::new(FromStd::new(
                std::fs::File::options()
                    .create(true)
                    .append(true)
                    .open(path)?,
            )));
        }

        Ok(Tap { port, dump })
    }
}

/// A port that traces raw traffic, and optionally records it.
pub struct Tap<P> {
    port: P,
    dump: Option<SerializerWrap<FromStd<std::fs::File>>>,
}

impl<P> Tap<P> {
    fn record(&mut self, direction: Direction, data: &[u8]) -> std::io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        crate::hexdump::trace_hexdump(&format!("{} ", direction.arrow()), data);

        if let Some(ref mut dump) = self.dump {
            // longer writes are split so the length always fits
            for part in data.chunks(u16::MAX as usize) {
                dump.write_u8(direction as u8)?;
                dump.write_le_u16(part.len() as u16)?;
                dump.write_bytes(part)?;
            }
        }
        Ok(())
    }
}

impl<P> embedded_io::ErrorType for Tap<P> {
    type Error = std::io::Error;
}

impl<P> embedded_io::Read for Tap<P>
where
    P: embedded_io::Read + embedded_io::ErrorType<Error = std::io::Error>,
{
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let amt = self.port.read(buf)?;
        self.record(Direction::FromPeer, &buf[..amt])?;
        Ok(amt)
    }
}

impl<P> embedded_io::ReadReady for Tap<P>
where
    P: embedded_io::ReadReady + embedded_io::ErrorType<Error = std::io::Error>,
{
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        self.port.read_ready()
    }
}

impl<P> embedded_io::Write for Tap<P>
where
    P: embedded_io::Write + embedded_io::ErrorType<Error = std::io::Error>,
{
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let amt = self.port.write(buf)?;
        self.record(Direction::FromHost, &buf[..amt])?;
        Ok(amt)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if let Some(ref mut dump) = self.dump {
            embedded_io::Write::flush(&mut **dump)?;
        }
        self.port.flush()
    }
}

/// Human-readable summary of a packet's payload.
pub fn describe(packet: &Packet) -> String {
    let payload = packet.payload();
    let parsed = match packet.message_type() {
        Some(MessageType::Ack) => Ack::from_payload(payload).map(|m| m.to_string()),
        Some(MessageType::Nack) => Nack::from_payload(payload).map(|m| m.to_string()),
        Some(MessageType::Boot) => Boot::from_payload(payload).map(|m| m.to_string()),
        Some(MessageType::Handshake) => Handshake::from_payload(payload).map(|m| m.to_string()),
        Some(MessageType::Log) => util::ascii_field(payload).map(|s| format!("{:?}", s.trim_end())),
        Some(MessageType::Ping) if payload.len() >= 4 => Some(format!(
            "timestamp {}",
            u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]])
        )),
        _ => None,
    };

    let name = match packet.message_type() {
        Some(typ) => typ.to_string(),
        None => format!("unknown (0x{:02x})", packet.typ()),
    };
    match parsed {
        Some(parsed) => format!("{} seq {}: {}", name, packet.seq(), parsed),
        None => format!("{} seq {}, {} bytes", name, packet.seq(), payload.len()),
    }
}

/// Logs everything the link reports.
#[derive(Debug, Default)]
pub struct Logger;

impl Handler for Logger {
    fn packet(&mut self, packet: &Packet) {
        tracing::debug!("<<< {}", describe(packet));
        crate::hexdump::trace_hexdump("<<<   ", packet.payload());
    }

    fn event(&mut self, event: Event) {
        match event.level() {
            Level::Error => tracing::error!("{}", event),
            Level::Warn => tracing::warn!("{}", event),
            Level::Info => tracing::info!("{}", event),
            Level::Debug => tracing::debug!("{}", event),
        }
    }
}

/// Keeps the events a command is waiting for, and logs everything.
#[derive(Debug, Default)]
pub struct Watcher {
    pub handshake: Option<Handshake>,
    pub booted: Option<Option<Boot>>,
    pub packets: Vec<Packet>,
}

impl Handler for Watcher {
    fn packet(&mut self, packet: &Packet) {
        Logger.packet(packet);
        self.packets.push(packet.clone());
    }

    fn event(&mut self, event: Event) {
        match &event {
            Event::Handshake(hs) => self.handshake = Some(*hs),
            Event::PeerBooted(boot) => self.booted = Some(*boot),
            _ => {}
        }
        Logger.event(event);
    }
}
