//! Property tests for the serialization codecs.

use entirel_codec::{CborCodec, JsonCodec, SerializeCodec, Value};
use proptest::prelude::*;

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
        proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            proptest::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

proptest! {
    #[test]
    fn cbor_decode_inverts_encode(value in arb_value()) {
        let bytes = CborCodec.encode(&value).unwrap();
        prop_assert_eq!(CborCodec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn json_decode_inverts_encode(value in arb_value()) {
        let bytes = JsonCodec.encode(&value).unwrap();
        prop_assert_eq!(JsonCodec.decode(&bytes).unwrap(), value);
    }
}
