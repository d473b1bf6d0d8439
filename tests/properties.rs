//! Property tests for the catalog, negotiation and codec.

use handshake::codec;
use handshake::protocol::{
    default_versions, intersect, Message, NoIntersection, ParamShape, ParamValue, Rejection,
    VersionNumber, VersionTable,
};
use proptest::prelude::*;

/// Parameters with the shape the codec expects for `version`
fn params_for(version: VersionNumber, magic: i64, flag: bool, pair: bool) -> ParamValue {
    let shape = ParamShape::for_version(version).unwrap_or(if pair {
        ParamShape::Pair
    } else {
        ParamShape::Scalar
    });
    match shape {
        ParamShape::Scalar => ParamValue::Scalar(magic),
        ParamShape::Pair => ParamValue::Pair(magic, flag),
    }
}

fn entries_strategy() -> impl Strategy<Value = Vec<(VersionNumber, ParamValue)>> {
    prop::collection::hash_map(
        1u32..=12,
        (any::<i64>(), any::<bool>(), any::<bool>()),
        0..=6,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .map(|(v, (magic, flag, pair))| (v, params_for(v, magic, flag, pair)))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_default_versions_shape(magic in any::<i64>()) {
        let table = default_versions(magic);
        prop_assert_eq!(table.versions(), vec![1, 2, 3, 4, 5, 6]);
        for v in 1..=3 {
            prop_assert_eq!(table.get(v), Some(&ParamValue::Scalar(magic)));
        }
        for v in 4..=6 {
            prop_assert_eq!(table.get(v), Some(&ParamValue::Pair(magic, false)));
        }
    }

    #[test]
    fn prop_intersect_is_order_independent(
        (local, shuffled_local) in entries_strategy()
            .prop_flat_map(|e| (Just(e.clone()), Just(e).prop_shuffle())),
        (remote, shuffled_remote) in entries_strategy()
            .prop_flat_map(|e| (Just(e.clone()), Just(e).prop_shuffle())),
    ) {
        let a = intersect(
            &local.into_iter().collect::<VersionTable>(),
            &remote.into_iter().collect::<VersionTable>(),
        );
        let b = intersect(
            &shuffled_local.into_iter().rev().collect::<VersionTable>(),
            &shuffled_remote.into_iter().collect::<VersionTable>(),
        );
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_intersect_picks_highest_shared_with_local_params(
        local in entries_strategy(),
        remote in entries_strategy(),
    ) {
        let local: VersionTable = local.into_iter().collect();
        let remote: VersionTable = remote.into_iter().collect();

        let shared = local
            .versions()
            .into_iter()
            .filter(|v| remote.contains(*v))
            .max();

        match (intersect(&local, &remote), shared) {
            (Ok(agreed), Some(v)) => {
                prop_assert_eq!(agreed.version, v);
                prop_assert_eq!(Some(&agreed.params), local.get(v));
            }
            (Err(NoIntersection), None) => {}
            (result, shared) => prop_assert!(false, "{:?} vs {:?}", result, shared),
        }
    }

    #[test]
    fn prop_propose_roundtrip(entries in entries_strategy()) {
        let table: VersionTable = entries.into_iter().collect();
        let message = Message::propose_versions(table.clone());

        let bytes = codec::encode(&message).unwrap();
        let decoded = codec::decode(&bytes).unwrap();

        prop_assert_eq!(decoded.get_versions(), Some(&table));
        prop_assert_eq!(codec::encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn prop_truncated_accept_names_its_version(
        version in 1u32..=12,
        magic in any::<i64>(),
        flag in any::<bool>(),
        pair in any::<bool>(),
        cut in any::<prop::sample::Index>(),
    ) {
        let params = params_for(version, magic, flag, pair);
        let bytes = codec::encode(&Message::accept(version, params)).unwrap();
        let params_len = serde_cbor::to_vec(&params.to_cbor()).unwrap().len();

        // cut anywhere after the version number
        let start = bytes.len() - params_len;
        let len = start + cut.index(params_len);

        let err = codec::decode(&bytes[..len]).unwrap_err();
        prop_assert!(
            matches!(
                err.rejection(),
                Some(Rejection::DecodeError { version: v, .. }) if *v == version
            ),
            "got {:?}",
            err
        );
    }
}

#[test]
fn test_single_shared_key() {
    let local = default_versions(764824073);
    for k in 1..=6 {
        let remote = VersionTable::new().with(k, ParamValue::Scalar(0));
        let agreed = intersect(&local, &remote).unwrap();
        assert_eq!(agreed.version, k);
        assert_eq!(&agreed.params, local.get(k).unwrap());
    }
}

#[test]
fn test_highest_shared_version_keeps_local_flag() {
    let local = default_versions(764824073);
    let remote = VersionTable::new()
        .with(3, ParamValue::Scalar(764824073))
        .with(4, ParamValue::Pair(764824073, true))
        .with(7, ParamValue::Scalar(1));

    let agreed = intersect(&local, &remote).unwrap();
    assert_eq!(agreed.version, 4);
    assert_eq!(agreed.params, ParamValue::Pair(764824073, false));
}
