//! General parsing utilities.

use nom::bytes::complete::take;
use nom::combinator::map_res;

/// Parse a statically-sized array of bytes.
pub fn parse_array<const LEN: usize>(input: &[u8]) -> nom::IResult<&[u8], [u8; LEN]> {
    map_res(take(LEN), |bytes: &[u8]| <[u8; LEN]>::try_from(bytes))(input)
}

/// The text in a fixed-width ASCII field, up to the first `NUL`.
pub fn ascii_field(data: &[u8]) -> Option<&str> {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    core::str::from_utf8(&data[..end]).ok()
}
