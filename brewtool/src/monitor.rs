use std::time::{Duration, Instant};

use crate::debug::Logger;

#[derive(clap::Args, Debug)]
pub struct MonitorOpts {
    #[command(flatten)]
    port: crate::common::SerialPortArgs,
    #[command(flatten)]
    debug: crate::debug::DebugArgs,

    /// Send a ping this often, in milliseconds.
    #[arg(long)]
    ping: Option<u64>,
    /// Ask the peer for its boot packet first.
    #[arg(long)]
    boot_info: bool,
    /// Stop after this many seconds.
    #[arg(long)]
    seconds: Option<u64>,
}

impl crate::ToolRun for MonitorOpts {
    fn run(&self) -> anyhow::Result<()> {
        let mut link = crate::common::open_link(&self.port, &self.debug)?;
        let mut logger = Logger;

        if self.boot_info {
            link.request_boot_info()?;
        }

        let start = Instant::now();
        let ping = self.ping.map(Duration::from_millis);
        let mut last_ping = start;
        let mut last_stats = (0, 0);

        loop {
            link.poll(&mut logger)?;

            if let Some(interval) = ping {
                if last_ping.elapsed() >= interval {
                    link.send_ping()?;
                    last_ping = Instant::now();
                }
            }

            let stats = (link.packets_received(), link.packet_errors());
            if stats.1 != last_stats.1 {
                tracing::debug!("{} packets received, {} errors", stats.0, stats.1);
            }
            last_stats = stats;

            if let Some(seconds) = self.seconds {
                if start.elapsed() >= Duration::from_secs(seconds) {
                    break;
                }
            }

            std::thread::sleep(Duration::from_millis(1));
        }

        tracing::info!(
            "{} packets received, {} errors",
            link.packets_received(),
            link.packet_errors()
        );
        Ok(())
    }
}
