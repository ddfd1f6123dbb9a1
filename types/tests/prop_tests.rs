use proptest::prelude::*;

use strata_types::{Amount, BatchId, BlockHash, SubBlockHash, Timestamp, TxHash};

proptest! {
    /// BlockHash::is_zero is true only for all-zero bytes.
    #[test]
    fn block_hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        prop_assert_eq!(hash.is_zero(), bytes == [0u8; 32]);
    }

    /// Hash ordering follows byte ordering, so BTreeMap keys are deterministic.
    #[test]
    fn sub_block_hash_order_matches_bytes(
        a in prop::array::uniform32(0u8..),
        b in prop::array::uniform32(0u8..),
    ) {
        prop_assert_eq!(SubBlockHash::new(a) < SubBlockHash::new(b), a < b);
    }

    /// TxHash survives bincode unchanged (it is persisted inside every record).
    #[test]
    fn tx_hash_bincode_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = TxHash::new(bytes);
        let encoded = bincode::serialize(&hash).unwrap();
        let decoded: TxHash = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, hash);
    }

    /// Amount::checked_add agrees with u128::checked_add.
    #[test]
    fn amount_checked_add(a in any::<u128>(), b in any::<u128>()) {
        let got = Amount::new(a).checked_add(Amount::new(b)).map(|x| x.raw());
        prop_assert_eq!(got, a.checked_add(b));
    }

    /// Subtracting then adding back restores the original amount.
    #[test]
    fn amount_sub_then_add(a in any::<u128>(), b in any::<u128>()) {
        let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
        let diff = Amount::new(hi).checked_sub(Amount::new(lo)).unwrap();
        prop_assert_eq!(diff.checked_add(Amount::new(lo)), Some(Amount::new(hi)));
    }

    /// Timestamp elapsed_since saturates to 0 when now < self.
    #[test]
    fn timestamp_elapsed_since_saturates(base in 1u64..1_000_000, deficit in 1u64..1_000_000) {
        let later = Timestamp::new(base + deficit);
        let earlier = Timestamp::new(base);
        prop_assert_eq!(later.elapsed_since(earlier), 0);
        prop_assert_eq!(earlier.elapsed_since(later), deficit);
    }

    /// has_expired flips exactly at start + duration.
    #[test]
    fn timestamp_has_expired_boundary(start in 0u64..1_000_000, duration in 0u64..1_000_000) {
        let t = Timestamp::new(start);
        prop_assert!(t.has_expired(duration, Timestamp::new(start + duration)));
        if duration > 0 {
            prop_assert!(!t.has_expired(duration, Timestamp::new(start + duration - 1)));
        }
    }

    /// Batch ids order by recency.
    #[test]
    fn batch_id_next_is_greater(raw in 0u64..u64::MAX) {
        let id = BatchId::new(raw);
        prop_assert!(id.next() > id);
    }
}
