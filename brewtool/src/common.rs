use std::io::{Read as _, Write as _};
use std::time::Duration;

use brewlib::event::Handler;
use brewlib::protocol::MessageType;
use brewlib::time::StdClock;
use brewlib::Link;

use crate::debug::{DebugArgs, Tap};

/// How long a TCP peek waits before deciding nothing is ready.
const TCP_PEEK_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(clap::Args, Debug, Clone)]
pub struct SerialPortArgs {
    #[arg(default_value_t = default_serial_port())]
    port: String,
    #[arg(short, long, default_value_t = brewlib::protocol::BAUD_RATE)]
    baud: u32,
    /// The port is a pty or similar, shared with other programs.
    #[arg(long)]
    plain_file: bool,
    /// Treat the port as a TCP address, such as a serial bridge.
    #[arg(long)]
    tcp: bool,
}

#[derive(Debug)]
pub enum SerialPort {
    Serial(std::io::BufWriter<Box<dyn serialport::SerialPort>>),
    Tcp(std::io::BufWriter<std::net::TcpStream>),
}

pub fn default_serial_port() -> String {
    if let Ok(infos) = serialport::available_ports() {
        for info in infos {
            #[cfg(target_os = "macos")]
            if info.port_name.ends_with(".Bluetooth-Incoming-Port") {
                // these ports are almost always *not* what we want
                continue;
            }

            #[cfg(target_os = "macos")]
            if info.port_name.starts_with("/dev/tty.") {
                // macos ports with tty. have flow control we don't use
                // use cu. ports instead!
                continue;
            }

            return info.port_name.clone();
        }
    }

    // not great, but reasonable fallback
    "/dev/ttyUSB0".to_owned()
}

impl SerialPortArgs {
    pub fn open(&self) -> anyhow::Result<SerialPort> {
        if self.tcp {
            let port = std::net::TcpStream::connect(&self.port)?;
            port.set_read_timeout(Some(TCP_PEEK_TIMEOUT))?;
            port.set_nodelay(true)?;
            Ok(SerialPort::Tcp(std::io::BufWriter::new(port)))
        } else if self.plain_file {
            // still a tty, so bytes_to_read works and reads never block
            #[allow(unused_mut)]
            let mut port = serialport::new(&self.port, self.baud)
                .timeout(std::time::Duration::from_secs(1))
                .open_native()?;
            #[cfg(unix)]
            port.set_exclusive(false)?;
            let port: Box<dyn serialport::SerialPort> = Box::new(port);
            Ok(SerialPort::Serial(std::io::BufWriter::new(port)))
        } else {
            let mut port = serialport::new(&self.port, self.baud).open()?;
            port.set_timeout(std::time::Duration::from_secs(1))?;
            Ok(SerialPort::Serial(std::io::BufWriter::new(port)))
        }
    }

    pub fn name(&self) -> &str {
        &self.port
    }
}

impl embedded_io::ErrorType for SerialPort {
    type Error = std::io::Error;
}

impl embedded_io::Read for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self {
            Self::Serial(port) => port.get_mut().read(buf),
            Self::Tcp(port) => match port.get_mut().read(buf) {
                Ok(0) if !buf.is_empty() => Err(connection_closed()),
                Err(e) if is_timeout(&e) => Ok(0),
                other => other,
            },
        }
    }
}

impl embedded_io::ReadReady for SerialPort {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        match self {
            Self::Serial(port) => Ok(port.get_ref().bytes_to_read()? > 0),
            Self::Tcp(port) => match port.get_ref().peek(&mut [0]) {
                Ok(0) => Err(connection_closed()),
                Ok(_) => Ok(true),
                Err(e) if is_timeout(&e) => Ok(false),
                Err(e) => Err(e),
            },
        }
    }
}

impl embedded_io::Write for SerialPort {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        match self {
            Self::Serial(port) => port.write(buf),
            Self::Tcp(port) => port.write(buf),
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        match self {
            Self::Serial(port) => port.flush(),
            Self::Tcp(port) => port.flush(),
        }
    }
}

pub type ToolLink = Link<Tap<SerialPort>, StdClock>;

pub fn open_link(port: &SerialPortArgs, debug: &DebugArgs) -> anyhow::Result<ToolLink> {
    let tap = debug.wrap(port.open()?)?;
    tracing::debug!("opened {} at {} baud", port.name(), port.baud);
    Ok(Link::new(tap, StdClock::new()))
}

/// Poll `link` until `done` says so, or `timeout` runs out. Returns
/// whether `done` was satisfied.
pub fn poll_until<H, F>(
    link: &mut ToolLink,
    handler: &mut H,
    timeout: Duration,
    mut done: F,
) -> anyhow::Result<bool>
where
    H: Handler,
    F: FnMut(&H) -> bool,
{
    let start = std::time::Instant::now();
    loop {
        link.poll(handler)?;
        if done(&*handler) {
            return Ok(true);
        }
        if start.elapsed() >= timeout {
            return Ok(false);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

fn connection_closed() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed")
}

pub fn upload_bar(size: u64) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(size);
    bar.set_style(
        indicatif::ProgressStyle::with_template(
            "({spinner}) [{wide_bar}] ({percent:>3}%, {bytes_per_sec:>12})",
        )
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
        .progress_chars("=> ")
        .tick_strings(&[">>>  ", ">>  >", ">  >>", "  >>>", " >>> ", "-----"]),
    );
    bar
}

/// Ask before doing something drastic, unless `yes` was given.
pub fn confirm(prompt: &str, yes: bool) -> anyhow::Result<()> {
    if yes {
        return Ok(());
    }

    let go = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;
    if !go {
        anyhow::bail!("aborted");
    }
    Ok(())
}

/// A message type, by name or by code.
pub fn parse_message_type(s: &str) -> anyhow::Result<u8> {
    if let Some(typ) = MessageType::from_name(s) {
        return Ok(typ.code());
    }

    let code = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    code.map_err(|_| anyhow::anyhow!("unknown message type: {:?}", s))
}

/// Bytes written as hex, with optional spaces, colons or commas between
/// bytes.
pub fn parse_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    let digits: Vec<u8> = s
        .bytes()
        .filter(|b| !matches!(b, b' ' | b':' | b','))
        .collect();
    anyhow::ensure!(digits.len() % 2 == 0, "odd number of hex digits");

    digits
        .chunks(2)
        .map(|pair| -> anyhow::Result<u8> {
            let pair = std::str::from_utf8(pair)?;
            Ok(u8::from_str_radix(pair, 16)?)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn message_types() {
        assert_eq!(parse_message_type("CmdBrew").unwrap(), 0x13);
        assert_eq!(parse_message_type("cmdgetconfig").unwrap(), 0x16);
        assert_eq!(parse_message_type("0x1f").unwrap(), 0x1f);
        assert_eq!(parse_message_type("35").unwrap(), 35);
        assert!(parse_message_type("espresso").is_err());
        assert!(parse_message_type("0x100").is_err());
    }

    #[test]
    fn hex() {
        assert!(parse_hex("").unwrap().is_empty());
        assert_eq!(parse_hex("01ff").unwrap(), vec![0x01, 0xff]);
        assert_eq!(parse_hex("e8 03").unwrap(), vec![0xe8, 0x03]);
        assert_eq!(parse_hex("aa:55,0A").unwrap(), vec![0xaa, 0x55, 0x0a]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    fn tcp_pair() -> (SerialPort, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let args = SerialPortArgs {
            port: listener.local_addr().unwrap().to_string(),
            baud: brewlib::protocol::BAUD_RATE,
            plain_file: false,
            tcp: true,
        };
        let port = args.open().unwrap();
        let (peer, _) = listener.accept().unwrap();
        (port, peer)
    }

    #[test]
    fn tcp_readiness() {
        use embedded_io::{Read, ReadReady};

        let (mut port, mut peer) = tcp_pair();
        assert!(!port.read_ready().unwrap());

        peer.write_all(&[0xaa, 0x01]).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(port.read_ready().unwrap());
        let mut buf = [0; 8];
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert!(!port.read_ready().unwrap());
    }

    #[test]
    fn tcp_close_is_an_error() {
        use embedded_io::{Read, ReadReady};

        let (mut port, peer) = tcp_pair();
        drop(peer);
        std::thread::sleep(Duration::from_millis(50));

        let err = port.read_ready().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
        let err = port.read(&mut [0; 8]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[cfg(unix)]
    #[test]
    fn pty_is_not_ready_when_idle() {
        use embedded_io::{Read, ReadReady};

        let (master, mut slave) = serialport::TTYPort::pair().unwrap();
        let master: Box<dyn serialport::SerialPort> = Box::new(master);
        let mut port = SerialPort::Serial(std::io::BufWriter::new(master));
        assert!(!port.read_ready().unwrap());

        slave.write_all(&[0x55, 0xaa]).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(port.read_ready().unwrap());
        let mut buf = [0; 8];
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(buf[..2], [0x55, 0xaa]);
        assert!(!port.read_ready().unwrap());
    }
}
