use crate::pages::traits::Storable;
use std::fmt;

/// Fixed-width opaque key, compared byte by byte.
///
/// Integers are stored big-endian with the sign bit flipped, so byte order
/// matches numeric order and the default comparator works unchanged.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenericKey<const N: usize>([u8; N]);

impl<const N: usize> GenericKey<N> {
    /// Fails the build for integer conversions on keys narrower than an `i64`.
    const FITS_INTEGER: () = assert!(N >= 8, "GenericKey needs 8 bytes to hold an integer");

    pub fn from_bytes(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Inverse of `From<i64>`.
    pub fn to_integer(&self) -> i64 {
        let () = Self::FITS_INTEGER;
        self.decode().unwrap_or_default()
    }

    fn decode(&self) -> Option<i64> {
        let prefix: [u8; 8] = self.0.get(..8)?.try_into().ok()?;
        Some((u64::from_be_bytes(prefix) ^ 1 << 63) as i64)
    }
}

impl<const N: usize> From<i64> for GenericKey<N> {
    fn from(value: i64) -> Self {
        let () = Self::FITS_INTEGER;
        let mut bytes = [0u8; N];
        bytes[..8].copy_from_slice(&(value as u64 ^ 1 << 63).to_be_bytes());
        Self(bytes)
    }
}

impl<const N: usize> Storable for GenericKey<N> {
    const SIZE: usize = N;

    fn to_bytes(&self, out: &mut [u8]) {
        out[..N].copy_from_slice(&self.0);
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&bytes[..N]);
        Self(buf)
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            Some(n) => write!(f, "GenericKey({n})"),
            None => write!(f, "GenericKey({:?})", self.0),
        }
    }
}

impl<const N: usize> fmt::Display for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            Some(n) => write!(f, "{n}"),
            None => write!(f, "{:?}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_order_matches_integer_order() {
        let keys = [-300_i64, -1, 0, 1, 2, 255, 256, i64::MAX];
        for pair in keys.windows(2) {
            let (a, b) = (GenericKey::<16>::from(pair[0]), GenericKey::<16>::from(pair[1]));
            assert!(a < b, "{a} should sort before {b}");
        }
        assert_eq!(GenericKey::<8>::from(-42).to_integer(), -42);
    }

    #[test]
    fn test_narrow_keys_print_raw_bytes() {
        let key = GenericKey::<4>::from_bytes([1, 2, 3, 4]);
        assert_eq!(format!("{key:?}"), "GenericKey([1, 2, 3, 4])");
        assert_eq!(key.to_string(), "[1, 2, 3, 4]");
        assert_eq!(format!("{}", GenericKey::<16>::from(7)), "7");
    }
}
