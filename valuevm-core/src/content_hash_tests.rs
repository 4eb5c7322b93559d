#[cfg(test)]
mod tests {
    use crate::content_hash::{content_hash, loose_equals, strict_equals};
    use crate::value::{BodyRef, ClassData, Value};
    use crate::ContentHash;
    use indexmap::IndexMap;
    use num_bigint::BigInt;
    use proptest::prelude::*;
    use std::rc::Rc;

    fn body(index: usize, name: &str, digest: u8) -> BodyRef {
        BodyRef {
            index,
            name: Rc::from(name),
            digest: ContentHash::from_bytes([digest; 32]),
        }
    }

    // ===== Structural equality =====

    #[test]
    fn test_arrays_compare_elementwise() {
        let a = Value::array(vec![Value::from(1), Value::from("x")]);
        let b = Value::array(vec![Value::from(1), Value::from("x")]);
        let c = Value::array(vec![Value::from("x"), Value::from(1)]);
        assert!(strict_equals(&a, &b));
        assert!(!strict_equals(&a, &c));
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn test_object_equality_ignores_field_order() {
        let a = Value::object([("x", Value::from(3)), ("y", Value::from(5))]);
        let b = Value::object([("y", Value::from(5)), ("x", Value::from(3))]);
        assert!(strict_equals(&a, &b));
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_eq!(a.codify(), r#"{"x":3,"y":5}"#);
        assert_eq!(b.codify(), r#"{"y":5,"x":3}"#);
    }

    #[test]
    fn test_objects_with_different_prototypes_differ() {
        let a = Value::object_with_prototype([("x", Value::from(1))], Value::object([("m", Value::from(1))]));
        let b = Value::object([("x", Value::from(1))]);
        assert!(!strict_equals(&a, &b));
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_primitive_edge_cases() {
        assert!(!strict_equals(&Value::from(f64::NAN), &Value::from(f64::NAN)));
        assert!(strict_equals(&Value::from(0.0), &Value::from(-0.0)));
        assert_eq!(content_hash(&Value::from(0.0)), content_hash(&Value::from(-0.0)));
        assert!(strict_equals(&Value::Void, &Value::Undefined));
        assert!(!strict_equals(&Value::Null, &Value::Undefined));
        assert!(!strict_equals(&Value::from(1), &Value::from("1")));
        assert!(strict_equals(&Value::from(BigInt::from(7)), &Value::from(BigInt::from(7))));
    }

    #[test]
    fn test_cached_hash_survives_until_mutation() {
        let mut value = Value::array(vec![Value::from(1)]);
        let first = content_hash(&value);
        assert_eq!(content_hash(&value), first);
        let shared = value.clone();
        if let Value::Array(handle) = &mut value {
            handle.get_mut().elements[0] = Value::from(2);
        }
        assert_ne!(content_hash(&value), first);
        assert_eq!(content_hash(&shared), first);
    }

    // ===== Functions and classes =====

    #[test]
    fn test_functions_compare_by_body_and_captures() {
        let f = Value::function(body(0, "f", 1), vec![Value::from(1)]);
        let g = Value::function(body(4, "g", 1), vec![Value::from(1)]);
        let h = Value::function(body(0, "f", 1), vec![Value::from(2)]);
        let k = Value::function(body(0, "f", 2), vec![Value::from(1)]);
        assert!(strict_equals(&f, &g), "declaration site does not matter");
        assert!(!strict_equals(&f, &h), "captures participate");
        assert!(!strict_equals(&f, &k), "body digest participates");
    }

    #[test]
    fn test_classes_compare_by_content() {
        let make = |ctor_index: usize| {
            let methods = Value::object([("lenSq", Value::function(body(ctor_index + 1, "lenSq", 9), vec![]))]);
            Value::class(ClassData::new(
                "Point",
                Value::function(body(ctor_index, "constructor", 8), vec![]),
                methods,
                IndexMap::new(),
            ))
        };
        assert!(strict_equals(&make(0), &make(10)));

        let renamed = Value::class(ClassData::new(
            "Vector",
            Value::function(body(0, "constructor", 8), vec![]),
            Value::object([("lenSq", Value::function(body(1, "lenSq", 9), vec![]))]),
            IndexMap::new(),
        ));
        assert!(!strict_equals(&make(0), &renamed));
    }

    // ===== Loose equality =====

    #[test]
    fn test_loose_equality() {
        assert!(loose_equals(&Value::Null, &Value::Undefined));
        assert!(!loose_equals(&Value::Null, &Value::from(0)));
        assert!(loose_equals(&Value::from(1), &Value::from("1")));
        assert!(loose_equals(&Value::from(true), &Value::from(1)));
        assert!(loose_equals(&Value::from(BigInt::from(2)), &Value::from(2)));
        assert!(loose_equals(&Value::from(BigInt::from(2)), &Value::from("2")));
        assert!(loose_equals(&Value::array(vec![Value::from(1)]), &Value::from(1)));
        assert!(!loose_equals(&Value::from(f64::NAN), &Value::from(f64::NAN)));
    }

    // ===== Properties =====

    fn json_like() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            (-1000i32..1000).prop_map(Value::from),
            "[a-z]{0,4}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::array),
                prop::collection::vec(("[a-c]", inner), 0..4).prop_map(|fields| Value::object(fields)),
            ]
        })
    }

    fn rebuild(value: &Value) -> Value {
        match value {
            Value::Array(a) => Value::array(a.read().elements.iter().map(rebuild).collect()),
            Value::Object(o) => {
                let mut fields: Vec<_> = o.read().fields.iter().map(|(k, v)| (k.clone(), rebuild(v))).collect();
                fields.reverse();
                Value::object(fields)
            }
            other => other.clone(),
        }
    }

    proptest! {
        #[test]
        fn prop_independent_construction_is_equal(value in json_like()) {
            let copy = rebuild(&value);
            prop_assert!(strict_equals(&value, &copy));
            prop_assert_eq!(content_hash(&value), content_hash(&copy));
        }

        #[test]
        fn prop_hash_agrees_with_equality(a in json_like(), b in json_like()) {
            if strict_equals(&a, &b) {
                prop_assert_eq!(content_hash(&a), content_hash(&b));
            } else {
                prop_assert_ne!(content_hash(&a), content_hash(&b));
            }
        }
    }
}
