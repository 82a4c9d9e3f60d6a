//! Rice-Golomb decoding for compressed prefix additions.
//!
//! The server may send 4-byte prefix additions as a delta-encoded sequence
//! of 32-bit integers: a first value followed by Golomb-Rice-coded deltas.
//! Each delta is an unary quotient (1-bits terminated by a 0) followed by a
//! `rice_parameter`-bit remainder, packed LSB-first within each byte.

use crate::error::{Error, Result};

/// A Rice-coded batch as it arrives off the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RiceDeltaEncoding {
    /// The first (smallest) value of the sequence.
    pub first_value: u32,
    /// The Golomb-Rice parameter `k`; remainders are `k` bits wide.
    pub rice_parameter: u32,
    /// Number of delta-encoded entries following the first value.
    pub entry_count: u32,
    pub data: Vec<u8>,
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize, // bit offset from the start
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bit(&mut self) -> Result<u32> {
        let byte = self
            .data
            .get(self.pos / 8)
            .ok_or_else(|| Error::Protocol("rice data truncated".into()))?;
        let bit = (byte >> (self.pos % 8)) & 1;
        self.pos += 1;
        Ok(u32::from(bit))
    }

    fn read_bits(&mut self, n: u32) -> Result<u32> {
        let mut value = 0;
        for i in 0..n {
            value |= self.read_bit()? << i;
        }
        Ok(value)
    }
}

/// Decodes the batch into its original sorted sequence of 32-bit values.
pub fn decode(enc: &RiceDeltaEncoding) -> Result<Vec<u32>> {
    if enc.rice_parameter >= 32 {
        return Err(Error::Protocol(format!(
            "rice parameter out of range: {}",
            enc.rice_parameter
        )));
    }
    let mut values = Vec::with_capacity(enc.entry_count as usize + 1);
    values.push(enc.first_value);

    let mut reader = BitReader::new(&enc.data);
    let mut last = enc.first_value;
    for _ in 0..enc.entry_count {
        let mut quotient: u32 = 0;
        while reader.read_bit()? == 1 {
            quotient += 1;
        }
        let remainder = reader.read_bits(enc.rice_parameter)?;
        let delta = (quotient << enc.rice_parameter) | remainder;
        last = last
            .checked_add(delta)
            .ok_or_else(|| Error::Protocol("rice delta overflow".into()))?;
        values.push(last);
    }
    Ok(values)
}

struct BitWriter {
    data: Vec<u8>,
    pos: usize,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
        }
    }

    fn write_bit(&mut self, bit: u32) {
        if self.pos % 8 == 0 {
            self.data.push(0);
        }
        if bit != 0 {
            *self.data.last_mut().unwrap() |= 1 << (self.pos % 8);
        }
        self.pos += 1;
    }

    fn write_bits(&mut self, value: u32, n: u32) {
        for i in 0..n {
            self.write_bit((value >> i) & 1);
        }
    }
}

/// Encodes a sorted sequence of 32-bit values. The inverse of [`decode`];
/// this is what in-memory test servers use to fabricate responses.
pub fn encode(values: &[u32], rice_parameter: u32) -> Result<RiceDeltaEncoding> {
    assert!(rice_parameter < 32);
    let Some((&first, rest)) = values.split_first() else {
        return Ok(RiceDeltaEncoding::default());
    };

    let mut writer = BitWriter::new();
    let mut last = first;
    for &v in rest {
        let delta = v.checked_sub(last).ok_or_else(|| {
            Error::Protocol("rice input must be sorted ascending".into())
        })?;
        let quotient = delta >> rice_parameter;
        for _ in 0..quotient {
            writer.write_bit(1);
        }
        writer.write_bit(0);
        writer.write_bits(delta, rice_parameter);
        last = v;
    }

    Ok(RiceDeltaEncoding {
        first_value: first,
        rice_parameter,
        entry_count: rest.len() as u32,
        data: writer.data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let values = vec![3, 17, 4096, 70000, 70001, u32::MAX - 5, u32::MAX];
        for k in [2, 10, 20, 28] {
            let enc = encode(&values, k).unwrap();
            assert_eq!(enc.entry_count, values.len() as u32 - 1);
            assert_eq!(decode(&enc).unwrap(), values);
        }
    }

    #[test]
    fn test_single_value() {
        let enc = encode(&[42], 10).unwrap();
        assert_eq!(enc.entry_count, 0);
        assert!(enc.data.is_empty());
        assert_eq!(decode(&enc).unwrap(), vec![42]);
    }

    #[test]
    fn test_truncated_data_rejected() {
        let mut enc = encode(&[1, 1000, 2000, 3000], 2).unwrap();
        enc.data.truncate(1);
        assert!(decode(&enc).is_err());
    }

    #[test]
    fn test_unsorted_input_rejected() {
        assert!(encode(&[5, 3], 2).is_err());
    }

    #[test]
    fn test_zero_deltas_round_trip() {
        // Duplicate values are representable; the diff layer rejects them.
        let values = vec![9, 9, 9];
        let enc = encode(&values, 4).unwrap();
        assert_eq!(decode(&enc).unwrap(), values);
    }
}
