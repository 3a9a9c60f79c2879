//! Upward read interface and typed reads on top of it.
//!
//! Marshaling code above the buffering layer sees only `ByteInput`. Scalars
//! and scalar arrays are decoded in network byte order.

use crate::error::{NetError, Result};
use crate::input::buffered::BufferedInput;
use bytes::{Buf, BytesMut};

/// Byte-stream reads exposed to deserialization code.
pub trait ByteInput {
    /// Read one byte.
    fn read_byte(&mut self) -> Result<u8>;

    /// Copy up to `length` bytes into `dest[offset..]`; `None` at end of stream.
    fn read_buffered(&mut self, dest: &mut [u8], offset: usize, length: usize)
        -> Result<Option<usize>>;

    /// Fill `dest[offset..offset + length]` completely.
    fn read_array(&mut self, dest: &mut [u8], offset: usize, length: usize) -> Result<()>;
}

impl ByteInput for BufferedInput {
    fn read_byte(&mut self) -> Result<u8> {
        BufferedInput::read_byte(self)
    }

    fn read_buffered(
        &mut self,
        dest: &mut [u8],
        offset: usize,
        length: usize,
    ) -> Result<Option<usize>> {
        BufferedInput::read_buffered(self, dest, offset, length)
    }

    fn read_array(&mut self, dest: &mut [u8], offset: usize, length: usize) -> Result<()> {
        BufferedInput::read_array(self, dest, offset, length)
    }
}

/// Typed reads, available on every `ByteInput`.
pub trait PrimitiveInput: ByteInput {
    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? != 0)
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.read_byte()
    }

    fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_byte()? as i8)
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(read_fixed(self)?))
    }

    fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(read_fixed(self)?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(read_fixed(self)?))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(read_fixed(self)?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(read_fixed(self)?))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(read_fixed(self)?))
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(read_fixed(self)?))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(read_fixed(self)?))
    }

    /// Fill `dest` with consecutive big-endian `u16` values.
    fn read_u16_array(&mut self, dest: &mut [u16]) -> Result<()> {
        let mut raw = read_raw(self, dest.len(), 2)?;
        for v in dest.iter_mut() {
            *v = raw.get_u16();
        }
        Ok(())
    }

    /// Fill `dest` with consecutive big-endian `u32` values.
    fn read_u32_array(&mut self, dest: &mut [u32]) -> Result<()> {
        let mut raw = read_raw(self, dest.len(), 4)?;
        for v in dest.iter_mut() {
            *v = raw.get_u32();
        }
        Ok(())
    }

    /// Fill `dest` with consecutive big-endian `u64` values.
    fn read_u64_array(&mut self, dest: &mut [u64]) -> Result<()> {
        let mut raw = read_raw(self, dest.len(), 8)?;
        for v in dest.iter_mut() {
            *v = raw.get_u64();
        }
        Ok(())
    }

    /// Fill `dest` with consecutive big-endian `f64` values.
    fn read_f64_array(&mut self, dest: &mut [f64]) -> Result<()> {
        let mut raw = read_raw(self, dest.len(), 8)?;
        for v in dest.iter_mut() {
            *v = raw.get_f64();
        }
        Ok(())
    }
}

impl<T: ByteInput + ?Sized> PrimitiveInput for T {}

fn read_fixed<const N: usize, I: ByteInput + ?Sized>(input: &mut I) -> Result<[u8; N]> {
    let mut raw = [0u8; N];
    input.read_array(&mut raw, 0, N)?;
    Ok(raw)
}

/// Read `count` elements of `width` bytes in one array read.
fn read_raw<I: ByteInput + ?Sized>(input: &mut I, count: usize, width: usize) -> Result<BytesMut> {
    let len = count
        .checked_mul(width)
        .ok_or_else(|| NetError::invalid("array length overflow"))?;
    let mut raw = BytesMut::zeroed(len);
    input.read_array(&mut raw, 0, len)?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ChunkDriver;
    use crate::input::{BlockPools, Driver, InputConfig};
    use bytes::BufMut;

    fn input_over(data: BytesMut, mtu: usize) -> BufferedInput {
        let driver = ChunkDriver::new(data.freeze(), mtu);
        let mut input =
            BufferedInput::new(Driver::pulls(driver), BlockPools::new(), InputConfig::default());
        input.init_receive(mtu, 0).unwrap();
        input
    }

    #[test]
    fn test_scalars_across_chunks() {
        let mut data = BytesMut::new();
        data.put_u8(1);
        data.put_i8(-2);
        data.put_u16(0xBEEF);
        data.put_i32(-123_456);
        data.put_u64(u64::MAX - 1);
        data.put_f64(2.5);
        data.put_f32(-0.75);
        data.put_i16(-9);
        data.put_i64(i64::MIN);
        data.put_u32(7);

        // A 3 byte MTU splits nearly every scalar across physical chunks.
        let mut input = input_over(data, 3);
        assert!(input.read_bool().unwrap());
        assert_eq!(input.read_i8().unwrap(), -2);
        assert_eq!(input.read_u16().unwrap(), 0xBEEF);
        assert_eq!(input.read_i32().unwrap(), -123_456);
        assert_eq!(input.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(input.read_f64().unwrap(), 2.5);
        assert_eq!(input.read_f32().unwrap(), -0.75);
        assert_eq!(input.read_i16().unwrap(), -9);
        assert_eq!(input.read_i64().unwrap(), i64::MIN);
        assert_eq!(input.read_u32().unwrap(), 7);
        assert!(matches!(input.read_u8(), Err(NetError::ConnectionClosed)));
    }

    #[test]
    fn test_scalar_arrays() {
        let mut data = BytesMut::new();
        for i in 0..300u32 {
            data.put_u32(i * 3);
        }
        for i in 0..4u16 {
            data.put_u16(i);
        }
        data.put_u64(42);
        data.put_f64(-1.0);

        let mut input = input_over(data, 64);
        let mut words = vec![0u32; 300];
        input.read_u32_array(&mut words).unwrap();
        assert!(words.iter().enumerate().all(|(i, &w)| w == i as u32 * 3));
        // 1200 bytes crosses the default zero-copy threshold.
        assert!(input.stats().view_fills > 0);

        let mut shorts = [0u16; 4];
        input.read_u16_array(&mut shorts).unwrap();
        assert_eq!(shorts, [0, 1, 2, 3]);

        let mut longs = [0u64; 1];
        input.read_u64_array(&mut longs).unwrap();
        assert_eq!(longs, [42]);

        let mut doubles = [0f64; 1];
        input.read_f64_array(&mut doubles).unwrap();
        assert_eq!(doubles, [-1.0]);
    }

    #[test]
    fn test_through_trait_object() {
        let mut data = BytesMut::new();
        data.put_u16(513);
        let mut input = input_over(data, 0);
        let byte_input: &mut dyn ByteInput = &mut input;
        assert_eq!(byte_input.read_u16().unwrap(), 513);
    }
}
