use std::time::Duration;

use brewlib::bootloader::{FlashConfig, Progress, MAX_CHUNK_LEN};

use crate::common::poll_until;
use crate::debug::Watcher;

#[derive(clap::Args, Debug)]
pub struct FlashOpts {
    firmware: String,

    #[command(flatten)]
    port: crate::common::SerialPortArgs,
    #[command(flatten)]
    debug: crate::debug::DebugArgs,

    #[arg(short, long)]
    yes: bool,
    /// Image bytes per chunk.
    #[arg(long, default_value_t = FlashConfig::default().chunk_size)]
    chunk_size: usize,
    /// How long to wait for the new firmware to boot, in seconds.
    #[arg(long, default_value_t = 35)]
    reboot_timeout: u64,
}

/// Moves a progress bar along as chunks are accepted.
struct BarProgress<'a>(&'a indicatif::ProgressBar);

impl Progress for BarProgress<'_> {
    fn chunk_sent(&mut self, sent: usize, _total: usize) {
        self.0.set_position(sent as u64);
    }
}

impl crate::ToolRun for FlashOpts {
    fn run(&self) -> anyhow::Result<()> {
        let image = std::fs::read(&self.firmware)?;
        anyhow::ensure!(!image.is_empty(), "firmware image is empty");
        anyhow::ensure!(
            self.chunk_size > 0 && self.chunk_size <= MAX_CHUNK_LEN,
            "chunk size must be between 1 and {}",
            MAX_CHUNK_LEN
        );

        let config = FlashConfig {
            chunk_size: self.chunk_size,
            ..Default::default()
        };

        let mut link = crate::common::open_link(&self.port, &self.debug)?;

        // see who we are about to overwrite
        let mut watcher = Watcher::default();
        link.request_boot_info()?;
        poll_until(&mut link, &mut watcher, Duration::from_millis(500), |w| {
            w.booted.is_some()
        })?;
        match watcher.booted {
            Some(Some(boot)) => eprintln!("Peer is running {}", boot),
            Some(None) => eprintln!("Peer is running unknown firmware"),
            None => eprintln!("Peer did not report its firmware"),
        }
        eprintln!(
            "Image is {} bytes, {} chunks.",
            image.len(),
            image.len().div_ceil(config.chunk_size)
        );
        eprintln!();
        crate::common::confirm("Continue flashing?", self.yes)?;

        let mut session = link.enter_bootloader_mode(&config)?;
        eprintln!("Connected to bootloader.");

        let bar = crate::common::upload_bar(image.len() as u64);
        let summary = session.stream_firmware(&image, &config, BarProgress(&bar))?;
        bar.finish();
        session.finish();
        tracing::info!(
            "sent {} bytes in {} chunks",
            summary.bytes,
            summary.chunks
        );

        eprintln!("Waiting for peer to restart...");
        let mut watcher = Watcher::default();
        let booted = poll_until(
            &mut link,
            &mut watcher,
            Duration::from_secs(self.reboot_timeout),
            |w| w.booted.is_some(),
        )?;
        if !booted {
            anyhow::bail!("peer did not come back after flashing");
        }

        match watcher.booted {
            Some(Some(boot)) => eprintln!("Peer is now running {}", boot),
            _ => eprintln!("Peer restarted."),
        }
        Ok(())
    }
}
