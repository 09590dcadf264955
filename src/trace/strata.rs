//! Per-stratum cumulative counters
//!
//! A [`LogStrata`] holds one 64-bit counter per stratum (a coarse, fixed-size
//! slice of the address space). Strata are persisted as a packed varint
//! stream: each counter is unsigned LEB128, 7 data bits per byte with the
//! high bit set on every byte but the last. The counter count is implied by
//! the stream length.

use crate::error::{IndexError, IndexResult};

/// Longest LEB128 encoding of a u64
pub const MAX_VARINT_LEN: usize = 10;

/// Append `value` to `buf` as an unsigned LEB128 varint
pub fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value & !0x7f != 0 {
        buf.push(((value & 0x7f) | 0x80) as u8);
        value >>= 7;
    }
    buf.push((value & 0x7f) as u8);
}

/// Decode one varint from the front of `buf`
///
/// Returns the value and the number of bytes consumed.
pub fn get_varint(buf: &[u8]) -> IndexResult<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().enumerate().take(MAX_VARINT_LEN) {
        let bits = (byte & 0x7f) as u64;
        if i == MAX_VARINT_LEN - 1 && bits > 1 {
            return Err(IndexError::Corruption("varint overflows u64".to_string()));
        }
        value |= bits << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        Err(IndexError::Corruption("varint longer than 10 bytes".to_string()))
    } else {
        Err(IndexError::Corruption("truncated varint".to_string()))
    }
}

/// Fixed-length array of cumulative per-stratum counters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogStrata {
    counters: Vec<u64>,
}

impl LogStrata {
    /// All-zero strata with `count` counters
    pub fn new(count: usize) -> Self {
        Self {
            counters: vec![0; count],
        }
    }

    pub fn from_counters(counters: Vec<u64>) -> Self {
        Self { counters }
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn get(&self, index: usize) -> u64 {
        self.counters.get(index).copied().unwrap_or(0)
    }

    pub fn set(&mut self, index: usize, value: u64) {
        if let Some(counter) = self.counters.get_mut(index) {
            *counter = value;
        }
    }

    /// Add `delta` at `index`, or subtract it when replaying in reverse
    ///
    /// Forward and reverse updates wrap identically so a reverse update is
    /// always the exact inverse of the matching forward one.
    pub fn update(&mut self, index: usize, delta: u64, reverse: bool) {
        if let Some(counter) = self.counters.get_mut(index) {
            *counter = if reverse {
                counter.wrapping_sub(delta)
            } else {
                counter.wrapping_add(delta)
            };
        }
    }

    /// Spread `[address, address + len)` over the strata it intersects
    ///
    /// `amount` maps each intersected sub-range to the value added to its
    /// stratum. Addresses beyond the last stratum are charged to it.
    pub fn update_range<F>(
        &mut self,
        stratum_size: u64,
        address: u64,
        len: u64,
        reverse: bool,
        mut amount: F,
    ) where
        F: FnMut(u64, u64) -> u64,
    {
        if self.counters.is_empty() || len == 0 {
            return;
        }
        let last = self.counters.len() - 1;
        let end = address.saturating_add(len);
        let mut start = address;
        while start < end {
            let stratum = start / stratum_size;
            let stratum_end = (stratum + 1).saturating_mul(stratum_size).min(end);
            let index = (stratum as usize).min(last);
            let delta = amount(start, stratum_end);
            self.update(index, delta, reverse);
            start = stratum_end;
        }
    }

    /// Sum of all counters
    pub fn total(&self) -> u64 {
        self.counters.iter().sum()
    }

    pub fn counters(&self) -> &[u64] {
        &self.counters
    }

    /// Reset every counter to zero, keeping the length
    pub fn clear(&mut self) {
        self.counters.iter_mut().for_each(|c| *c = 0);
    }

    /// Encode as a varint stream
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.counters.len() * 2);
        for &counter in &self.counters {
            put_varint(&mut buf, counter);
        }
        buf
    }

    /// Decode a varint stream produced by [`LogStrata::pack`]
    pub fn unpack(mut buf: &[u8]) -> IndexResult<Self> {
        let mut counters = Vec::new();
        while !buf.is_empty() {
            let (value, used) = get_varint(buf)?;
            counters.push(value);
            buf = &buf[used..];
        }
        Ok(Self { counters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    #[test]
    fn test_varint_encoding() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 0);
        put_varint(&mut buf, 127);
        put_varint(&mut buf, 128);
        put_varint(&mut buf, 300);
        assert_eq!(buf, vec![0x00, 0x7f, 0x80, 0x01, 0xac, 0x02]);

        assert_eq!(get_varint(&[0xac, 0x02]).unwrap(), (300, 2));
    }

    #[test]
    fn test_varint_extremes() {
        let mut buf = Vec::new();
        put_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), MAX_VARINT_LEN);
        assert_eq!(get_varint(&buf).unwrap(), (u64::MAX, MAX_VARINT_LEN));
    }

    #[test]
    fn test_varint_corruption() {
        assert!(matches!(
            get_varint(&[0x80, 0x80]),
            Err(IndexError::Corruption(_))
        ));
        assert!(get_varint(&[]).is_err());
        assert!(get_varint(&[0xff; 11]).is_err());
        // Tenth byte may only carry the top bit of a u64
        assert!(get_varint(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02]).is_err());
    }

    proptest! {
        #[test]
        fn pack_unpack_preserves_counters(counters in vec(any::<u64>(), 0..128)) {
            let strata = LogStrata::from_counters(counters);
            let packed = strata.pack();
            prop_assert_eq!(LogStrata::unpack(&packed).unwrap(), strata);
        }

        #[test]
        fn small_counters_pack_to_at_most_eight_bytes(counters in vec(0u64..1 << 56, 1..64)) {
            let strata = LogStrata::from_counters(counters);
            let packed = strata.pack();
            prop_assert!(packed.len() <= strata.len() * 8);
            prop_assert_eq!(LogStrata::unpack(&packed).unwrap(), strata);
        }
    }

    #[test]
    fn test_pack_empty_and_zero() {
        assert!(LogStrata::new(0).pack().is_empty());
        let zeros = LogStrata::new(16);
        let packed = zeros.pack();
        assert_eq!(packed.len(), 16);
        assert_eq!(LogStrata::unpack(&packed).unwrap(), zeros);
    }

    #[test]
    fn test_update_reverse_is_inverse() {
        let mut strata = LogStrata::new(4);
        strata.set(2, 10);
        let before = strata.clone();

        strata.update(2, 7, false);
        assert_eq!(strata.get(2), 17);
        strata.update(2, 7, true);
        assert_eq!(strata, before);

        // Out-of-range indices are ignored
        strata.update(9, 1, false);
        assert_eq!(strata, before);
    }

    #[test]
    fn test_update_range_splits_at_boundaries() {
        let mut strata = LogStrata::new(4);
        // 0x30..0x150 with 0x100-byte strata: 0xd0 bytes in 0, 0x50 in 1
        strata.update_range(0x100, 0x30, 0x120, false, |s, e| e - s);
        assert_eq!(strata.counters(), &[0xd0, 0x50, 0, 0]);

        // Beyond the last stratum is charged to it
        strata.update_range(0x100, 0x1000, 8, false, |s, e| e - s);
        assert_eq!(strata.get(3), 8);
        assert_eq!(strata.total(), 0x128);
    }
}
