/// Generic CRC style, for encoding and decoding frames.
pub trait CrcStyle {
    type Digest<'a>: CrcDigest
    where
        Self: 'a;

    fn digest<'a>(&'a self) -> Self::Digest<'a>;

    fn checksum(&self, bytes: &[u8]) -> u16 {
        let mut digest = self.digest();
        digest.update(bytes);
        digest.finalize()
    }
}

/// Interface for a CRC digest.
pub trait CrcDigest {
    fn update(&mut self, bytes: &[u8]);
    fn finalize(self) -> u16;
}

impl<C> CrcStyle for &C
where
    C: CrcStyle,
{
    type Digest<'a> = C::Digest<'a> where Self: 'a;

    fn digest<'a>(&'a self) -> Self::Digest<'a> {
        (*self).digest()
    }
}

/// CRC-16/CCITT-FALSE, used on every frame in both directions.
///
/// Polynomial 0x1021, initial value 0xFFFF, no reflection, no final
/// XOR. Computed bit by bit, without a lookup table.
pub static CRC_CCITT: crc::Crc<u16, crc::NoTable> =
    crc::Crc::<u16, crc::NoTable>::new(&crc::CRC_16_IBM_3740);

/// Compute the frame CRC over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    CRC_CCITT.checksum(data)
}

impl CrcStyle for crc::Crc<u16, crc::NoTable> {
    type Digest<'a> = crc::Digest<'a, u16, crc::NoTable>;

    fn digest<'a>(&'a self) -> Self::Digest<'a> {
        crc::Crc::<u16, crc::NoTable>::digest(self)
    }
}

impl<'a> CrcDigest for crc::Digest<'a, u16, crc::NoTable> {
    fn update(&mut self, bytes: &[u8]) {
        crc::Digest::<'a, u16, crc::NoTable>::update(self, bytes)
    }

    fn finalize(self) -> u16 {
        crc::Digest::<'a, u16, crc::NoTable>::finalize(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_is_init_value() {
        assert_eq!(crc16(&[]), 0xffff);
    }

    #[test]
    fn check_value() {
        assert_eq!(crc16(b"123456789"), 0x29b1);
    }

    #[test]
    fn short_input() {
        assert_eq!(crc16(&[0x01, 0x02, 0x03]), 0xadad);
    }

    #[test]
    fn split_digest_matches_oneshot() {
        let mut digest = CRC_CCITT.digest();
        CrcDigest::update(&mut digest, b"1234");
        CrcDigest::update(&mut digest, b"56789");
        assert_eq!(CrcDigest::finalize(digest), 0x29b1);
    }

    #[quickcheck_macros::quickcheck]
    fn style_matches_crate(data: Vec<u8>) -> bool {
        crc16(&data) == CrcStyle::checksum(&&CRC_CCITT, &data)
    }
}
