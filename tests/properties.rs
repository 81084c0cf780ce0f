//! Universal round-trip invariants, checked over generated inputs.

use std::rc::Rc;

use packweave::{Codec, Value};
use proptest::prelude::*;

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Nil),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        any::<u64>().prop_map(Value::UInt),
        any::<f64>().prop_map(Value::Float),
        any::<String>().prop_map(Value::String),
        proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Binary),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            proptest::collection::vec((inner.clone(), inner), 0..6).prop_map(Value::Map),
        ]
    })
}

proptest! {
    #[test]
    fn primitive_values_roundtrip(value in arb_value()) {
        let codec = Codec::new();
        let bytes = codec.dumps(&value).unwrap();
        let decoded = codec.loads(&bytes).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn foreign_ext_records_roundtrip(tag in 1i8..100, data in proptest::collection::vec(any::<u8>(), 0..32)) {
        // INTERN_TAG (6) and CUSTOM_TAG (8) are reserved; everything else must
        // pass through untouched.
        prop_assume!(tag != 6 && tag != 8);
        let codec = Codec::new();
        let value = Value::Ext(tag, data.clone());
        let bytes = codec.dumps(&value).unwrap();
        let decoded = codec.loads(&bytes).unwrap();
        prop_assert_eq!(decoded, Value::Ext(tag, data));
    }

    #[test]
    fn interning_a_value_is_idempotent_under_decode(value in arb_value()) {
        let codec = Codec::new();
        let shared = Rc::new(value.clone());
        let wrapped = Value::Array(vec![
            Value::intern_by_identity(shared.clone()),
            Value::intern_by_identity(shared),
        ]);
        let bytes = codec.dumps(&wrapped).unwrap();
        let decoded = codec.loads(&bytes).unwrap();
        prop_assert_eq!(decoded, Value::Array(vec![value.clone(), value]));
    }

    #[test]
    fn repeated_identity_interning_dedups_to_one_entry(values in proptest::collection::vec(arb_value(), 1..5), repeats in 2usize..6) {
        let codec = Codec::new();
        let shared = Rc::new(Value::Array(values));
        let items: Vec<Value> = (0..repeats).map(|_| Value::intern_by_identity(shared.clone())).collect();
        let bytes = codec.dumps(&Value::Array(items)).unwrap();

        // A deduped encoding wraps in exactly one INTERN_TAG frame with exactly
        // one entry, regardless of how many times the value was referenced.
        let decoded = codec.loads(&bytes).unwrap();
        let Value::Array(decoded_items) = decoded else { unreachable!() };
        prop_assert_eq!(decoded_items.len(), repeats);
        for pair in decoded_items.windows(2) {
            prop_assert_eq!(&pair[0], &pair[1]);
        }
    }
}
