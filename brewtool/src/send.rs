use std::time::{Duration, Instant};

use brewlib::protocol::MAX_PAYLOAD;

use crate::common::{parse_hex, parse_message_type, poll_until};
use crate::debug::{describe, Watcher};

#[derive(clap::Args, Debug)]
pub struct SendOpts {
    /// Message type, by name (CmdGetConfig) or code (0x16).
    #[arg(value_parser = parse_message_type)]
    typ: u8,
    /// Payload, as hex.
    #[arg(long)]
    payload: Option<String>,

    #[command(flatten)]
    port: crate::common::SerialPortArgs,
    #[command(flatten)]
    debug: crate::debug::DebugArgs,

    /// Send even if the peer asked us to back off.
    #[arg(long)]
    force: bool,
    /// Give up after being held off this long, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    patience: u64,
    /// Listen for replies this long, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    listen: u64,
}

impl crate::ToolRun for SendOpts {
    fn run(&self) -> anyhow::Result<()> {
        let payload = match self.payload {
            Some(ref hex) => parse_hex(hex)?,
            None => Vec::new(),
        };
        let payload = &payload[..];
        anyhow::ensure!(
            payload.len() <= MAX_PAYLOAD,
            "payload is {} bytes, the limit is {}",
            payload.len(),
            MAX_PAYLOAD
        );

        let mut link = crate::common::open_link(&self.port, &self.debug)?;
        let mut watcher = Watcher::default();

        // pick up anything already waiting, NACKs included
        link.poll(&mut watcher)?;

        if self.force {
            link.send_packet(self.typ, payload)?;
        } else {
            let start = Instant::now();
            loop {
                match link.send_command(self.typ, payload) {
                    Ok(()) => break,
                    Err(nb::Error::WouldBlock) => {
                        if start.elapsed() >= Duration::from_millis(self.patience) {
                            anyhow::bail!("peer is still asking us to back off");
                        }
                        link.poll(&mut watcher)?;
                        std::thread::sleep(Duration::from_millis(1));
                    }
                    Err(nb::Error::Other(e)) => return Err(e.into()),
                }
            }
        }
        tracing::info!("sent type 0x{:02x}, {} bytes", self.typ, payload.len());

        let already = watcher.packets.len();
        poll_until(
            &mut link,
            &mut watcher,
            Duration::from_millis(self.listen),
            |_| false,
        )?;

        for packet in &watcher.packets[already..] {
            println!("{}", describe(packet));
        }
        Ok(())
    }
}
