//! On-disk tensor format (spec section 6): `u64 channels; u64 rows; u64
//! cols;` then `channels*rows*cols` IEEE-754 `f32` values in `(channel, row,
//! col)` order, each field big-endian on the wire regardless of host
//! endianness ("portable bytes").

use super::leaves::F32Tensor;
use super::Tensor;
use crate::errors::{HappyMlError, HappyMlResult};
use std::io::{Read, Write};

pub fn save_tensor(tensor: &dyn Tensor, writer: &mut dyn Write) -> HappyMlResult<()> {
    let (rows, cols, channels) = tensor.shape();
    writer
        .write_all(&(channels as u64).to_be_bytes())
        .map_err(|e| HappyMlError::io("<tensor stream>", e))?;
    writer
        .write_all(&(rows as u64).to_be_bytes())
        .map_err(|e| HappyMlError::io("<tensor stream>", e))?;
    writer
        .write_all(&(cols as u64).to_be_bytes())
        .map_err(|e| HappyMlError::io("<tensor stream>", e))?;
    for channel in 0..channels {
        for row in 0..rows {
            for col in 0..cols {
                let v = tensor.value(row, col, channel);
                writer
                    .write_all(&v.to_be_bytes())
                    .map_err(|e| HappyMlError::io("<tensor stream>", e))?;
            }
        }
    }
    Ok(())
}

/// Reads a tensor from the on-disk format into a 32-bit materialized leaf.
/// Callers that want a different precision can re-materialize afterward.
pub fn load_tensor_f32(reader: &mut dyn Read) -> HappyMlResult<F32Tensor> {
    let channels = read_u64(reader)? as usize;
    let rows = read_u64(reader)? as usize;
    let cols = read_u64(reader)? as usize;
    let mut data = Vec::with_capacity(channels * rows * cols);
    for _ in 0..(channels * rows * cols) {
        data.push(read_f32(reader)?);
    }
    F32Tensor::from_channel_major(rows, cols, channels, data)
}

fn read_u64(reader: &mut dyn Read) -> HappyMlResult<u64> {
    let mut buf = [0u8; 8];
    reader
        .read_exact(&mut buf)
        .map_err(|e| HappyMlError::io("<tensor stream>", e))?;
    Ok(u64::from_be_bytes(buf))
}

fn read_f32(reader: &mut dyn Read) -> HappyMlResult<f32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|e| HappyMlError::io("<tensor stream>", e))?;
    Ok(f32::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::leaves::F32Tensor;

    #[test]
    fn round_trips_through_bytes() {
        let original = F32Tensor::from_channel_major(3, 3, 1, (0..9).map(|v| v as f32).collect())
            .unwrap();
        let mut buf = Vec::new();
        save_tensor(&original, &mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let loaded = load_tensor_f32(&mut cursor).unwrap();
        assert_eq!(loaded.shape(), original.shape());
        for ch in 0..1 {
            for r in 0..3 {
                for c in 0..3 {
                    assert_eq!(loaded.value(r, c, ch), original.value(r, c, ch));
                }
            }
        }
    }
}
