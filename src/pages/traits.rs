/// Fixed-width values that can be laid out inside a page slot.
///
/// `to_bytes` must write exactly `SIZE` bytes and `from_bytes` must
/// read the same `SIZE` bytes back; callers hand in slices of that length.
pub trait Storable: Copy + Send + Sync + 'static {
    const SIZE: usize;

    fn to_bytes(&self, out: &mut [u8]);
    fn from_bytes(bytes: &[u8]) -> Self;
}

macro_rules! impl_storable_for_int {
    ($($ty: ty),*) => {
        $(
            impl Storable for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn to_bytes(&self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn from_bytes(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_storable_for_int!(u32, i32, u64, i64);

/// Reads a `T` stored at `offset`.
pub(crate) fn read_at<T: Storable>(buf: &[u8], offset: usize) -> T {
    T::from_bytes(&buf[offset..offset + T::SIZE])
}

/// Writes `value` at `offset`.
pub(crate) fn write_at<T: Storable>(buf: &mut [u8], offset: usize, value: T) {
    value.to_bytes(&mut buf[offset..offset + T::SIZE]);
}
