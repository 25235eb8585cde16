/// Max size of version string, including terminating `NUL`.
pub const VERSION_LEN: usize = 16;

/// The version this host was built as. Peers reporting anything else
/// get a mismatch warning.
pub const HOST_VERSION: Version = match Version::new_from_str(env!("CARGO_PKG_VERSION")) {
    Ok(v) => v,
    Err(_) => Version::new_empty(),
};

/// A short firmware version string, like `0.4.4`.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Default)]
pub struct Version([u8; VERSION_LEN]);

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VersionError {
    TooLong,
}

#[cfg(feature = "std")]
impl std::error::Error for VersionError {}

impl core::fmt::Display for VersionError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            VersionError::TooLong => write!(
                f,
                "version must be {} bytes or less, including NUL",
                VERSION_LEN
            ),
        }
    }
}

impl Version {
    pub const fn new_empty() -> Self {
        Self([0; VERSION_LEN])
    }

    pub const fn new_from_str(name: &str) -> Result<Self, VersionError> {
        Self::new_from_bytes(name.as_bytes())
    }

    pub const fn new_from_bytes(bytes: &[u8]) -> Result<Self, VersionError> {
        // use >= to force space for a terminating 0
        if bytes.len() >= VERSION_LEN {
            return Err(VersionError::TooLong);
        }

        let mut data = [0; VERSION_LEN];
        let mut i = 0;
        while i < bytes.len() && bytes[i] > 0 {
            data[i] = bytes[i];
            i += 1;
        }

        Ok(Self(data))
    }

    /// Build `major.minor.patch`, as the peer reports it.
    pub fn from_triple(major: u8, minor: u8, patch: u8) -> Self {
        use core::fmt::Write;

        // at most "255.255.255", which always fits
        let mut cursor = Cursor {
            data: [0; VERSION_LEN],
            len: 0,
        };
        let _ = write!(cursor, "{}.{}.{}", major, minor, patch);
        Self(cursor.data)
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    pub fn as_str(&self) -> Result<&str, core::str::Utf8Error> {
        let zero = self.0.iter().position(|b| *b == 0).unwrap_or(VERSION_LEN);
        core::str::from_utf8(&self.0[..zero])
    }

    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

struct Cursor {
    data: [u8; VERSION_LEN],
    len: usize,
}

impl core::fmt::Write for Cursor {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let end = self.len + s.len();
        // keep the last byte for NUL
        if end >= VERSION_LEN {
            return Err(core::fmt::Error);
        }
        self.data[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

impl core::fmt::Display for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self.as_str() {
            Ok(s) => f.write_str(s),
            Err(_) => write!(f, "{:02x?}", self.as_bytes()),
        }
    }
}

impl core::fmt::Debug for Version {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> Result<(), core::fmt::Error> {
        match self.as_str() {
            Ok(s) => f.debug_tuple("Version").field(&s).finish(),
            Err(_) => f.debug_tuple("Version").field(&self.as_bytes()).finish(),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Version {
    fn format(&self, f: defmt::Formatter) {
        match self.as_str() {
            Ok(s) => defmt::write!(f, "Version({})", s),
            Err(_) => defmt::write!(f, "Version({})", self.as_bytes()),
        }
    }
}
