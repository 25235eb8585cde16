use super::crc::{CrcDigest, CrcStyle};

/// A trait for serializing frames and payloads.
pub trait Serializer {
    type Error;

    fn write_u8(&mut self, val: u8) -> Result<(), Self::Error>;

    // everything else can be written in terms of write_u8

    // Note: they *definitely should* be specialized in
    // SerializerLength and &mut S so if you add a method here, add
    // one there.

    fn write_bytes(&mut self, val: &[u8]) -> Result<(), Self::Error> {
        for b in val.iter() {
            self.write_u8(*b)?;
        }
        Ok(())
    }

    fn write_le_u16(&mut self, val: u16) -> Result<(), Self::Error> {
        self.write_bytes(&val.to_le_bytes())
    }

    fn write_le_u32(&mut self, val: u32) -> Result<(), Self::Error> {
        self.write_bytes(&val.to_le_bytes())
    }
}

impl<S> Serializer for &mut S
where
    S: Serializer,
{
    type Error = S::Error;

    fn write_u8(&mut self, val: u8) -> Result<(), Self::Error> {
        (*self).write_u8(val)
    }

    fn write_bytes(&mut self, val: &[u8]) -> Result<(), Self::Error> {
        (*self).write_bytes(val)
    }

    fn write_le_u16(&mut self, val: u16) -> Result<(), Self::Error> {
        (*self).write_le_u16(val)
    }

    fn write_le_u32(&mut self, val: u32) -> Result<(), Self::Error> {
        (*self).write_le_u32(val)
    }
}

/// Error returned when a [SerializerArray] runs out of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferFull;

impl core::fmt::Display for BufferFull {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "serialization buffer is full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BufferFull {}

/// A serializer writing into a fixed-size array.
#[derive(Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerializerArray<const SIZE: usize> {
    len: usize,
    buffer: [u8; SIZE],
}

impl<const SIZE: usize> SerializerArray<SIZE> {
    pub const fn new() -> Self {
        Self {
            len: 0,
            buffer: [0; SIZE],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl<const SIZE: usize> Default for SerializerArray<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> core::ops::Deref for SerializerArray<SIZE> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_bytes()
    }
}

impl<const SIZE: usize> core::fmt::Debug for SerializerArray<SIZE> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_tuple("SerializerArray")
            .field(&self.as_bytes())
            .finish()
    }
}

impl<const SIZE: usize> Serializer for SerializerArray<SIZE> {
    type Error = BufferFull;

    fn write_u8(&mut self, val: u8) -> Result<(), Self::Error> {
        let slot = self.buffer.get_mut(self.len).ok_or(BufferFull)?;
        *slot = val;
        self.len += 1;
        Ok(())
    }

    fn write_bytes(&mut self, val: &[u8]) -> Result<(), Self::Error> {
        let end = self.len + val.len();
        let dest = self.buffer.get_mut(self.len..end).ok_or(BufferFull)?;
        dest.copy_from_slice(val);
        self.len = end;
        Ok(())
    }
}

/// A serializer writing straight into an [embedded_io::Write].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SerializerWrap<T> {
    inner: T,
}

impl<T> SerializerWrap<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn done(self) -> T {
        self.inner
    }
}

impl<T> core::ops::Deref for SerializerWrap<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> core::ops::DerefMut for SerializerWrap<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<T> Serializer for SerializerWrap<T>
where
    T: embedded_io::Write,
{
    type Error = T::Error;

    fn write_u8(&mut self, val: u8) -> Result<(), Self::Error> {
        self.inner.write_all(&[val])
    }

    fn write_bytes(&mut self, val: &[u8]) -> Result<(), Self::Error> {
        self.inner.write_all(val)
    }
}

/// A serializer that only counts bytes written.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SerializerLength {
    len: usize,
}

impl SerializerLength {
    pub fn new() -> Self {
        SerializerLength { len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Serializer for SerializerLength {
    type Error = core::convert::Infallible;

    fn write_u8(&mut self, _val: u8) -> Result<(), Self::Error> {
        self.len += 1;
        Ok(())
    }

    fn write_bytes(&mut self, val: &[u8]) -> Result<(), Self::Error> {
        self.len += val.len();
        Ok(())
    }

    fn write_le_u16(&mut self, _val: u16) -> Result<(), Self::Error> {
        self.len += 2;
        Ok(())
    }

    fn write_le_u32(&mut self, _val: u32) -> Result<(), Self::Error> {
        self.len += 4;
        Ok(())
    }
}

/// A serializer that also computes a CRC on the side.
pub struct SerializerCrc<'a, C, T>
where
    C: CrcStyle + 'a,
{
    digest: C::Digest<'a>,
    inner: T,
}

impl<'a, C, T> SerializerCrc<'a, C, T>
where
    C: CrcStyle + 'a,
{
    pub fn new(crc: &'a C, inner: T) -> Self {
        Self {
            digest: crc.digest(),
            inner,
        }
    }

    pub fn finalize(self) -> (u16, T) {
        (self.digest.finalize(), self.inner)
    }
}

impl<'a, C, T> Serializer for SerializerCrc<'a, C, T>
where
    C: CrcStyle + 'a,
    T: Serializer,
{
    type Error = T::Error;

    fn write_u8(&mut self, val: u8) -> Result<(), Self::Error> {
        self.digest.update(&[val]);
        self.inner.write_u8(val)
    }

    fn write_bytes(&mut self, val: &[u8]) -> Result<(), Self::Error> {
        self.digest.update(val);
        self.inner.write_bytes(val)
    }
}

/// A serializer that also computes an XOR checksum on the side.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SerializerXor<T> {
    checksum: u8,
    inner: T,
}

impl<T> SerializerXor<T> {
    pub fn new(inner: T) -> Self {
        Self { checksum: 0, inner }
    }

    pub fn finalize(self) -> (u8, T) {
        (self.checksum, self.inner)
    }
}

impl<T> Serializer for SerializerXor<T>
where
    T: Serializer,
{
    type Error = T::Error;

    fn write_u8(&mut self, val: u8) -> Result<(), Self::Error> {
        self.checksum ^= val;
        self.inner.write_u8(val)
    }

    fn write_bytes(&mut self, val: &[u8]) -> Result<(), Self::Error> {
        self.checksum = val.iter().fold(self.checksum, |acc, b| acc ^ b);
        self.inner.write_bytes(val)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn array_overflow() {
        let mut ser = SerializerArray::<3>::new();
        ser.write_le_u16(0x0201).unwrap();
        assert_eq!(ser.write_le_u16(0x0403), Err(BufferFull));
        assert_eq!(ser.as_bytes(), &[0x01, 0x02]);
        ser.write_u8(0x03).unwrap();
        assert_eq!(ser.write_u8(0x04), Err(BufferFull));
        assert_eq!(ser.len(), 3);
    }

    #[test]
    fn wrap_writes_through() {
        let mut ser = SerializerWrap::new(Vec::new());
        ser.write_u8(0x01).unwrap_or_else(|e| match e {});
        ser.write_le_u16(0x0302).unwrap_or_else(|e| match e {});
        assert_eq!(ser.len(), 3);
        assert_eq!(ser.done(), vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn length_counts() {
        let mut ser = SerializerLength::new();
        ser.write_u8(0x01).unwrap_or_else(|e| match e {});
        ser.write_le_u16(0x0302).unwrap_or_else(|e| match e {});
        ser.write_le_u32(0x07060504).unwrap_or_else(|e| match e {});
        ser.write_bytes(&[0x08, 0x09]).unwrap_or_else(|e| match e {});
        assert_eq!(ser.len(), 9);
    }

    #[test]
    fn crc_on_the_side() {
        let mut ser = SerializerArray::<16>::new();
        let mut crc_ser = SerializerCrc::new(&super::super::crc::CRC_CCITT, &mut ser);
        crc_ser.write_bytes(b"1234").unwrap();
        crc_ser.write_bytes(b"56789").unwrap();
        let (crc, _) = crc_ser.finalize();
        assert_eq!(crc, 0x29b1);
        assert_eq!(ser.as_bytes(), b"123456789");
    }

    #[test]
    fn xor_on_the_side() {
        let mut ser = SerializerArray::<8>::new();
        let mut xor = SerializerXor::new(&mut ser);
        xor.write_u8(0x10).unwrap();
        xor.write_bytes(&[0x20, 0x30]).unwrap();
        let (checksum, _) = xor.finalize();
        assert_eq!(checksum, 0x00);
        assert_eq!(ser.as_bytes(), &[0x10, 0x20, 0x30]);
    }
}
