use clap::{Parser, Subcommand};

mod common;
mod debug;
mod flash;
mod handshake;
mod hexdump;
mod monitor;
mod parsedump;
mod send;

trait ToolRun {
    fn run(&self) -> anyhow::Result<()>;
}

/// Talk to an espresso machine controller over its UART link.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct ToolOptions {
    /// More output. Repeat for raw traffic. RUST_LOG overrides this.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    debug: u8,

    #[command(subcommand)]
    command: ToolCommand,
}

#[derive(Subcommand, Debug)]
enum ToolCommand {
    /// Log everything the peer sends.
    Monitor(monitor::MonitorOpts),
    /// Send one command, then show the replies.
    Send(send::SendOpts),
    /// Wait for the peer to handshake, and answer it.
    Handshake(handshake::HandshakeOpts),
    /// Update the peer's firmware through its bootloader.
    Flash(flash::FlashOpts),
    /// Decode a traffic capture.
    ParseDump(parsedump::ParseDumpOpts),
}

impl ToolRun for ToolCommand {
    fn run(&self) -> anyhow::Result<()> {
        use ToolCommand::*;
        match self {
            Monitor(o) => o.run(),
            Send(o) => o.run(),
            Handshake(o) => o.run(),
            Flash(o) => o.run(),
            ParseDump(o) => o.run(),
        }
    }
}

fn init_logging(debug: u8) {
    let level = match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let opts = ToolOptions::parse();
    init_logging(opts.debug);
    opts.command.run()
}
