use std::time::Duration;

use brewlib::protocol::messages::Handshake;

use crate::common::{poll_until, ToolLink};
use crate::debug::Watcher;

/// Wait for the peer to open the handshake. The link answers it.
///
/// The peer sends one at startup and again about once a minute until
/// it hears back, so a freshly reset peer is the quickest to catch.
#[derive(clap::Args, Debug)]
pub struct HandshakeOpts {
    #[command(flatten)]
    port: crate::common::SerialPortArgs,
    #[command(flatten)]
    debug: crate::debug::DebugArgs,

    /// How long to wait for the peer, in milliseconds.
    #[arg(long, default_value_t = 65_000)]
    timeout: u64,
}

impl crate::ToolRun for HandshakeOpts {
    fn run(&self) -> anyhow::Result<()> {
        let mut link = crate::common::open_link(&self.port, &self.debug)?;

        eprintln!("Waiting for the peer's handshake...");
        let peer = listen(&mut link, Duration::from_millis(self.timeout))?;

        println!("peer:    {}", peer);
        println!("replied: {}", Handshake::HOST);
        Ok(())
    }
}

/// Poll until the peer's handshake arrives and has been answered.
fn listen(link: &mut ToolLink, timeout: Duration) -> anyhow::Result<Handshake> {
    let mut watcher = Watcher::default();
    poll_until(link, &mut watcher, timeout, |w| w.handshake.is_some())?;

    match watcher.handshake {
        Some(hs) => Ok(hs),
        None => anyhow::bail!("peer did not send a handshake"),
    }
}
