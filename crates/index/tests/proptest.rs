//! Property-based tests for mapfold-index using proptest.

use mapfold_index::{codec, RangeIterator};
use mapfold_storage::Db;
use proptest::prelude::*;

fn component() -> impl Strategy<Value = Vec<u8>> {
    // Bias towards the bytes that decide ordering at block boundaries.
    prop::collection::vec(
        prop_oneof![Just(0u8), Just(1u8), Just(0xFFu8), any::<u8>()],
        0..10,
    )
}

fn components() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(component(), 0..4)
}

proptest! {
    /// Test that decoding an encoded key returns the components and seq.
    #[test]
    fn encode_decode_roundtrip(parts in components(), seq in any::<u64>()) {
        let key = codec::encode(&parts, seq).unwrap();
        let (decoded, decoded_seq) = codec::decode(&key).unwrap();
        prop_assert_eq!(decoded, parts);
        prop_assert_eq!(decoded_seq, seq);
    }

    /// Test that a single component encoding sorts like the raw bytes,
    /// including components of different lengths and zero padding.
    #[test]
    fn component_order_preserved(a in component(), b in component()) {
        let ka = codec::encode_prefix(&[&a]).unwrap();
        let kb = codec::encode_prefix(&[&b]).unwrap();
        prop_assert_eq!(ka.cmp(&kb), a.cmp(&b));
    }

    /// Test that keys sort by count, then components, then seq.
    #[test]
    fn key_order_matches_tuple_order(
        a in components(),
        b in components(),
        sa in any::<u64>(),
        sb in any::<u64>(),
    ) {
        let ka = codec::encode(&a, sa).unwrap();
        let kb = codec::encode(&b, sb).unwrap();
        let expected = a.len().cmp(&b.len()).then(a.cmp(&b)).then(sa.cmp(&sb));
        prop_assert_eq!(ka.cmp(&kb), expected);
    }

    /// Test that distinct inputs never share an encoding.
    #[test]
    fn encoding_is_injective(a in components(), b in components(), seq in 0u64..4) {
        prop_assume!(a != b);
        prop_assert_ne!(codec::encode(&a, seq).unwrap(), codec::encode(&b, seq).unwrap());
        prop_assert_ne!(codec::encode_prefix(&a).unwrap(), codec::encode_prefix(&b).unwrap());
    }

    /// Test that a node prefix only matches keys with exactly those components,
    /// and the deeper prefix only matches keys one level below.
    #[test]
    fn prefix_matches_exact_path(a in components(), b in components(), seq in any::<u64>()) {
        let key = codec::encode(&b, seq).unwrap();
        let node = codec::encode_prefix(&a).unwrap();
        prop_assert_eq!(key.starts_with(&node), a == b);

        let child = codec::encode_prefix(&b).unwrap();
        let deeper = codec::join_prefix(&a, true).unwrap();
        let nested = b.len() == a.len() + 1 && b[..a.len()] == a[..];
        prop_assert_eq!(child.starts_with(&deeper), nested);
    }

    /// Test that an iterator bound to a prefix never yields a key outside it,
    /// whatever sits before or after the index range.
    #[test]
    fn iterator_stays_in_prefix(
        entries in prop::collection::vec((components(), any::<u64>()), 0..40),
        prefix in components(),
        neighbour_before in any::<bool>(),
        neighbour_after in any::<bool>(),
    ) {
        let db = Db::memory();
        let index = db.sublevel("m");
        if neighbour_before {
            db.sublevel("a").put(b"k", b"before").unwrap();
        }
        if neighbour_after {
            db.sublevel("z").put(b"k", b"after").unwrap();
        }
        for (parts, seq) in &entries {
            index.put(&codec::encode(parts, *seq).unwrap(), b"v").unwrap();
        }

        let node = codec::encode_prefix(&prefix).unwrap();
        let mut expected: Vec<Vec<u8>> = entries
            .iter()
            .filter(|(parts, _)| *parts == prefix)
            .map(|(parts, seq)| codec::encode(parts, *seq).unwrap())
            .collect();
        expected.sort();
        expected.dedup();

        let mut forward = Vec::new();
        let mut iter = RangeIterator::over(&index, &node);
        iter.seek_first();
        while iter.valid() {
            prop_assert!(iter.key().starts_with(&node));
            prop_assert_eq!(iter.value(), b"v");
            forward.push(iter.key().to_vec());
            iter.next();
        }
        prop_assert_eq!(forward.len(), expected.len());

        let mut backward = 0;
        iter.seek_last();
        while iter.valid() {
            prop_assert!(iter.key().starts_with(&node));
            backward += 1;
            iter.prev();
        }
        prop_assert_eq!(backward, expected.len());
    }
}
