const WIDTH: usize = 0x10;

/// One line of a hex dump: an offset and up to [WIDTH] bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Line<'a> {
    offset: usize,
    data: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DedupLine<'a> {
    Data(Line<'a>),
    Duplicate,
}

pub fn printable(chr: u8) -> Option<char> {
    if (0x20..0x7f).contains(&chr) {
        Some(chr as char)
    } else {
        None
    }
}

impl<'a> std::fmt::Display for Line<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:04x}", self.offset)?;

        if self.data.is_empty() {
            return Ok(());
        }

        for i in 0..WIDTH {
            if i % 8 == 0 {
                write!(f, " ")?;
            }
            if i < self.data.len() {
                write!(f, " {:02x}", self.data[i])?;
            } else {
                write!(f, "   ")?;
            }
        }

        write!(f, "  |")?;

        for b in self.data {
            write!(f, "{}", printable(*b).unwrap_or('.'))?;
        }

        write!(f, "|")
    }
}

impl<'a> std::fmt::Display for DedupLine<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Data(line) => line.fmt(f),
            Self::Duplicate => write!(f, "*"),
        }
    }
}

/// Lines of a hex dump, with runs of identical lines folded into `*`
/// and a final line holding the total length.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DedupLineIter<'a> {
    data: &'a [u8],
    next: usize,
    endline: bool,
    last: Option<&'a [u8]>,
    in_duplicate: bool,
}

impl<'a> DedupLineIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            next: 0,
            endline: false,
            last: None,
            in_duplicate: false,
        }
    }

    fn next_line(&mut self) -> Option<Line<'a>> {
        let start = self.next;
        if start >= self.data.len() {
            if self.endline {
                return None;
            }
            self.endline = true;
            return Some(Line {
                offset: start,
                data: &[],
            });
        }

        let end = (start + WIDTH).min(self.data.len());
        self.next = end;
        Some(Line {
            offset: start,
            data: &self.data[start..end],
        })
    }
}

impl<'a> Iterator for DedupLineIter<'a> {
    type Item = DedupLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(line) = self.next_line() {
            if !line.data.is_empty() && self.last == Some(line.data) {
                if !self.in_duplicate {
                    self.in_duplicate = true;
                    return Some(DedupLine::Duplicate);
                }
            } else {
                self.last = Some(line.data);
                self.in_duplicate = false;
                return Some(DedupLine::Data(line));
            }
        }
        None
    }
}

pub fn hexdump_iter(data: &[u8]) -> DedupLineIter {
    DedupLineIter::new(data)
}

pub fn hexdump_prefix(prefix: &str, data: &[u8]) {
    for line in hexdump_iter(data) {
        println!("{}{}", prefix, line);
    }
}

/// Hex dump at trace level.
pub fn trace_hexdump(prefix: &str, data: &[u8]) {
    if !tracing::enabled!(tracing::Level::TRACE) {
        return;
    }
    for line in hexdump_iter(data) {
        tracing::trace!("{}{}", prefix, line);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dump(data: &[u8]) -> Vec<String> {
        hexdump_iter(data).map(|l| l.to_string()).collect()
    }

    #[test]
    fn short_line() {
        assert_eq!(
            dump(b"\xaa\x01Hi"),
            vec![
                "0000  aa 01 48 69                                       |..Hi|",
                "0004",
            ]
        );
    }

    #[test]
    fn folds_repeats() {
        let lines = dump(&[0u8; 0x40]);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("0000  00 00"));
        assert_eq!(lines[1], "*");
        assert_eq!(lines[2], "0040");
    }

    #[test]
    fn empty() {
        assert_eq!(dump(&[]), vec!["0000"]);
    }
}
