//! Point-in-time summaries of trace activity

use crate::trace::strata::LogStrata;
use crate::trace::transfer::{Transfer, TransferType};
use crate::trace::STRATUM_SIZE;

/// Cumulative traffic at one point in the log
///
/// `offset` is the log offset of the first transfer not yet applied, so an
/// instant taken at offset 0 is the zero state and every instant produced by
/// replay sits on a record boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogInstant {
    /// Clock ticks since the start of the log
    pub time: u64,
    /// Log offset of the next transfer to apply
    pub offset: u64,
    pub reads: LogStrata,
    pub writes: LogStrata,
    /// Write bytes whose value was zero
    pub zeros: LogStrata,
}

impl LogInstant {
    /// The zero instant for an address space split into `strata` strata
    pub fn new(strata: usize) -> Self {
        Self {
            time: 0,
            offset: 0,
            reads: LogStrata::new(strata),
            writes: LogStrata::new(strata),
            zeros: LogStrata::new(strata),
        }
    }

    /// Number of strata per counter set
    pub fn strata_count(&self) -> usize {
        self.reads.len()
    }

    /// Return to the start-of-log state
    pub fn clear(&mut self) {
        self.time = 0;
        self.offset = 0;
        self.reads.clear();
        self.writes.clear();
        self.zeros.clear();
    }

    pub fn update_time(&mut self, delta: u64, reverse: bool) {
        self.time = if reverse {
            self.time.wrapping_sub(delta)
        } else {
            self.time.wrapping_add(delta)
        };
    }

    /// Apply one transfer, or un-apply it when `reverse` is set
    ///
    /// `offset` moves by the record length, so applied at the record's start
    /// it lands on the record's end and reverse brings it back. Error records
    /// move time and offset but no counters.
    pub fn advance(&mut self, transfer: &Transfer, reverse: bool) {
        let len = transfer.byte_count as u64;
        match transfer.kind {
            TransferType::Read => {
                self.reads
                    .update_range(STRATUM_SIZE, transfer.address, len, reverse, |s, e| e - s);
            }
            TransferType::Write => {
                self.writes
                    .update_range(STRATUM_SIZE, transfer.address, len, reverse, |s, e| e - s);
                self.zeros.update_range(
                    STRATUM_SIZE,
                    transfer.address,
                    len,
                    reverse,
                    |s, e| transfer.zero_bytes_in(s, e),
                );
            }
            _ => {}
        }

        self.update_time(transfer.duration, reverse);
        let record_len = transfer.record_len as u64;
        self.offset = if reverse {
            self.offset.wrapping_sub(record_len)
        } else {
            self.offset.wrapping_add(record_len)
        };
    }

    /// Copy of `self` with `transfer` applied
    pub fn advanced(&self, transfer: &Transfer, reverse: bool) -> Self {
        let mut next = self.clone();
        next.advance(transfer, reverse);
        next
    }

    /// True if no counter in `self` exceeds the matching counter in `later`
    pub fn precedes(&self, later: &LogInstant) -> bool {
        fn le(a: &LogStrata, b: &LogStrata) -> bool {
            a.len() == b.len() && a.counters().iter().zip(b.counters()).all(|(x, y)| x <= y)
        }
        self.time <= later.time
            && self.offset <= later.offset
            && le(&self.reads, &later.reads)
            && le(&self.writes, &later.writes)
            && le(&self.zeros, &later.zeros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    fn placed(t: Transfer, offset: u64) -> Transfer {
        let len = 16 + t.data.len() as u32;
        t.at(offset, len)
    }

    #[test]
    fn test_zero_instant() {
        let instant = LogInstant::new(8);
        assert_eq!(instant.time, 0);
        assert_eq!(instant.strata_count(), 8);
        assert_eq!(instant.writes.total(), 0);
    }

    #[test]
    fn test_read_only_touches_reads() {
        let mut instant = LogInstant::new(4);
        instant.advance(&placed(Transfer::read(0x10, 32, 5), 0), false);

        assert_eq!(instant.reads.get(0), 32);
        assert_eq!(instant.writes.total(), 0);
        assert_eq!(instant.zeros.total(), 0);
        assert_eq!(instant.time, 5);
        assert_eq!(instant.offset, 16);
    }

    #[test]
    fn test_write_counts_zero_bytes_per_stratum() {
        let mut instant = LogInstant::new(4);
        // Straddles the boundary between strata 0 and 1
        let mut data = vec![0u8; 8];
        data[1] = 9;
        data[6] = 9;
        let t = placed(Transfer::write(STRATUM_SIZE - 4, data, 3), 0);
        instant.advance(&t, false);

        assert_eq!(instant.writes.get(0), 4);
        assert_eq!(instant.writes.get(1), 4);
        assert_eq!(instant.zeros.get(0), 3);
        assert_eq!(instant.zeros.get(1), 3);
    }

    #[test]
    fn test_error_records_only_move_time() {
        let mut instant = LogInstant::new(2);
        instant.advance(&placed(Transfer::error(TransferType::Overflow, 11), 0), false);
        assert_eq!(instant.time, 11);
        assert_eq!(instant.offset, 16);
        assert_eq!(instant.reads.total() + instant.writes.total(), 0);
    }

    #[test]
    fn test_forward_chain_is_monotonic() {
        let transfers = [
            Transfer::write(0x20, vec![0, 1, 2, 0, 0], 4),
            Transfer::read(STRATUM_SIZE * 3 + 7, 100, 9),
            Transfer::error(TransferType::Checksum, 2),
            Transfer::write(STRATUM_SIZE * 2 - 1, vec![0; 3], 0),
        ];

        let mut instant = LogInstant::new(4);
        for t in transfers {
            let t = placed(t, instant.offset);
            let forward = instant.advanced(&t, false);
            assert!(instant.precedes(&forward));
            assert_eq!(forward.offset, t.end_offset());
            instant = forward;
        }
    }

    #[test]
    fn test_reverse_restores_unrelated_offset() {
        let mut instant = LogInstant::new(2);
        instant.time = 100;
        instant.offset = 500;
        let t = Transfer::read(0, 8, 7).at(40, 24);

        let back = instant.advanced(&t, false).advanced(&t, true);
        assert_eq!(back, instant);
    }

    fn arb_instant() -> impl Strategy<Value = LogInstant> {
        (1usize..8).prop_flat_map(|n| {
            (
                any::<u64>(),
                any::<u64>(),
                vec(any::<u64>(), n),
                vec(any::<u64>(), n),
                vec(any::<u64>(), n),
            )
                .prop_map(|(time, offset, reads, writes, zeros)| LogInstant {
                    time,
                    offset,
                    reads: LogStrata::from_counters(reads),
                    writes: LogStrata::from_counters(writes),
                    zeros: LogStrata::from_counters(zeros),
                })
        })
    }

    fn arb_transfer() -> impl Strategy<Value = Transfer> {
        let address = prop_oneof![0u64..STRATUM_SIZE * 10, any::<u64>()];
        let kind = prop_oneof![
            (address.clone(), 0u32..4096, any::<u64>())
                .prop_map(|(a, n, d)| Transfer::read(a, n, d)),
            (address, vec(prop_oneof![Just(0u8), any::<u8>()], 0..256), any::<u64>())
                .prop_map(|(a, data, d)| Transfer::write(a, data, d)),
            (
                prop_oneof![
                    Just(TransferType::Overflow),
                    Just(TransferType::Sync),
                    Just(TransferType::Checksum),
                    Just(TransferType::Protocol),
                ],
                any::<u64>()
            )
                .prop_map(|(k, d)| Transfer::error(k, d)),
        ];
        (kind, any::<u64>(), any::<u32>()).prop_map(|(t, offset, len)| t.at(offset, len))
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            .. ProptestConfig::default()
        })]

        #[test]
        fn reverse_undoes_forward(instant in arb_instant(), t in arb_transfer()) {
            let forward = instant.advanced(&t, false);
            prop_assert_eq!(forward.advanced(&t, true), instant.clone());

            let backward = instant.advanced(&t, true);
            prop_assert_eq!(backward.advanced(&t, false), instant);
        }
    }

    #[test]
    fn test_clear() {
        let mut instant = LogInstant::new(3);
        instant.advance(&placed(Transfer::write(0, vec![0; 4], 2), 0), false);
        instant.clear();
        assert_eq!(instant, LogInstant::new(3));
    }
}
