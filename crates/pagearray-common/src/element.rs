//! Fixed-width element encoding
//!
//! Every element type stored in a page has a fixed byte width and a
//! little-endian encoding. Pages hold elements packed back to back, so an
//! element at offset `n` lives at bytes `n * SIZE .. (n + 1) * SIZE`.

/// A value that can be stored in a paged array
///
/// `Default::default()` must be the value whose encoding is all zero bytes;
/// freshly allocated storage is zero-filled and reads back as that value.
pub trait Element: Copy + Default + PartialEq + std::fmt::Debug + 'static {
    /// Encoded width in bytes
    const SIZE: usize;

    /// Encode into `dst`, which is exactly `SIZE` bytes long
    fn encode(self, dst: &mut [u8]);

    /// Decode from `src`, which is exactly `SIZE` bytes long
    fn decode(src: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Element for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn encode(self, dst: &mut [u8]) {
                    dst.copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn decode(src: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(src);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_element!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Element>(value: T) -> T {
        let mut buf = vec![0u8; T::SIZE];
        value.encode(&mut buf);
        T::decode(&buf)
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(u8::SIZE, 1);
        assert_eq!(i16::SIZE, 2);
        assert_eq!(u32::SIZE, 4);
        assert_eq!(f64::SIZE, 8);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut buf = [0u8; 4];
        0x0102_0304u32.encode(&mut buf);
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);

        let mut buf = [0u8; 4];
        (-2i32).encode(&mut buf);
        assert_eq!(buf, [0xfe, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_zero_bytes_decode_to_default() {
        assert_eq!(u32::decode(&[0; 4]), u32::default());
        assert_eq!(f64::decode(&[0; 8]), f64::default());
        assert_eq!(i8::decode(&[0]), 0);
    }

    #[test]
    fn test_extremes_survive_encoding() {
        assert_eq!(roundtrip(u32::MAX), u32::MAX);
        assert_eq!(roundtrip(i64::MIN), i64::MIN);
        assert_eq!(roundtrip(f32::MIN_POSITIVE), f32::MIN_POSITIVE);
    }
}
