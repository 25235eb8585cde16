use brewlib::protocol::{Decoded, Decoder, ReceiverState};

use crate::debug::{describe, Direction};

#[derive(clap::Args, Debug)]
pub struct ParseDumpOpts {
    dump: String,
    /// The file is plain bytes from the peer, not a --dump capture.
    #[arg(long)]
    raw: bool,
}

impl crate::ToolRun for ParseDumpOpts {
    fn run(&self) -> anyhow::Result<()> {
        let rawdata = std::fs::read(&self.dump)?;
        let mut dump = DumpDecoder::new(true);

        if self.raw {
            dump.feed(Direction::FromPeer, &rawdata);
        } else {
            let mut raw = &rawdata[..];
            while !raw.is_empty() {
                let offset = rawdata.len() - raw.len();
                let (rest, (dir, data)) =
                    record(raw).map_err(|_| anyhow::anyhow!("truncated record at 0x{:x}", offset))?;
                let dir = Direction::from_code(dir)
                    .ok_or_else(|| anyhow::anyhow!("bad direction {} at 0x{:x}", dir, offset))?;
                dump.feed(dir, data);
                raw = rest;
            }
        }

        println!();
        for line in dump.summary() {
            println!("{}", line);
        }
        Ok(())
    }
}

/// One record of a dump file: direction, u16 length, data.
fn record(input: &[u8]) -> nom::IResult<&[u8], (u8, &[u8])> {
    use nom::multi::length_data;
    use nom::number::complete::{le_u16, u8 as byte};
    use nom::sequence::tuple;

    tuple((byte, length_data(le_u16)))(input)
}

/// A decoder for each direction, and a transcript of what they found.
struct DumpDecoder {
    print: bool,
    from_peer: Decoder,
    from_host: Decoder,
    lines: Vec<String>,
}

impl DumpDecoder {
    fn new(print: bool) -> Self {
        Self {
            print,
            from_peer: Decoder::new(),
            from_host: Decoder::new(),
            lines: Vec::new(),
        }
    }

    fn feed(&mut self, dir: Direction, data: &[u8]) {
        let decoder = match dir {
            Direction::FromPeer => &mut self.from_peer,
            Direction::FromHost => &mut self.from_host,
        };

        for decoded in decoder.decode(data) {
            let line = match decoded {
                Decoded::Packet(ref packet) => {
                    if self.print {
                        println!("{} {}", dir.arrow(), describe(packet));
                        if !packet.payload().is_empty() {
                            crate::hexdump::hexdump_prefix("      ", packet.payload());
                        }
                    }
                    format!("{} {}", dir.arrow(), describe(packet))
                }
                Decoded::CrcError { received, expected } => {
                    let line = format!(
                        "{} crc error: received 0x{:04x}, expected 0x{:04x}",
                        dir.arrow(),
                        received,
                        expected
                    );
                    if self.print {
                        println!("{}", line);
                    }
                    line
                }
                Decoded::Overflow => {
                    let line = format!("{} frame too long, dropped", dir.arrow());
                    if self.print {
                        println!("{}", line);
                    }
                    line
                }
            };
            self.lines.push(line);
        }
    }

    fn summary(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, decoder) in [("peer", &self.from_peer), ("host", &self.from_host)] {
            out.push(format!(
                "from {}: {} packets, {} errors",
                name,
                decoder.packets_received(),
                decoder.packet_errors()
            ));
            if decoder.state() != ReceiverState::WaitingForSync {
                out.push(format!("from {}: capture ends inside a frame", name));
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use brewlib::protocol::Encoder;

    fn frame(typ: u8, payload: &[u8]) -> Vec<u8> {
        Encoder::new().encode(typ, payload).unwrap().to_vec()
    }

    #[test]
    fn records() {
        let data = [0x01, 0x02, 0x00, 0xaa, 0xbb, 0x00];
        let (rest, (dir, body)) = record(&data).unwrap();
        assert_eq!(dir, 1);
        assert_eq!(body, &[0xaa, 0xbb]);
        assert_eq!(rest, &[0x00]);

        assert!(record(&[0x00, 0x05, 0x00, 0x01]).is_err());
    }

    #[test]
    fn directions_decode_separately() {
        let ping = frame(0x00, &[0x01, 0x00, 0x00, 0x00]);
        let request = frame(0x23, &[]);
        let (ping_a, ping_b) = ping.split_at(5);

        let mut dump = DumpDecoder::new(false);
        // host bytes arriving between halves of a peer frame
        dump.feed(Direction::FromPeer, ping_a);
        dump.feed(Direction::FromHost, &request);
        dump.feed(Direction::FromPeer, ping_b);

        assert_eq!(
            dump.lines,
            vec![
                ">>> CmdGetBoot (0x23) seq 0, 0 bytes",
                "<<< Ping (0x00) seq 0: timestamp 1",
            ]
        );
        assert_eq!(
            dump.summary(),
            vec![
                "from peer: 1 packets, 0 errors",
                "from host: 1 packets, 0 errors",
            ]
        );
    }

    #[test]
    fn reports_errors() {
        let mut bad = frame(0x01, &[0x02]);
        let last = bad.len() - 1;
        bad[last] ^= 0x01;

        let mut dump = DumpDecoder::new(false);
        dump.feed(Direction::FromPeer, &bad);
        dump.feed(Direction::FromPeer, &[0xaa, 0x01]);

        assert_eq!(dump.lines.len(), 1);
        assert!(dump.lines[0].starts_with("<<< crc error"));
        assert_eq!(
            dump.summary(),
            vec![
                "from peer: 0 packets, 1 errors",
                "from peer: capture ends inside a frame",
                "from host: 0 packets, 0 errors",
            ]
        );
    }
}
