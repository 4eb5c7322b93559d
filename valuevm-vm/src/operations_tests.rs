//! Tests for operator semantics

#[cfg(test)]
mod tests {
    use crate::operations::*;
    use num_bigint::BigInt;
    use valuevm_bytecode::{BinaryOp, UnaryOp};
    use valuevm_core::{store_stats, Builtin, Value};

    fn bin(op: BinaryOp, lhs: impl Into<Value>, rhs: impl Into<Value>) -> Value {
        binary(op, &lhs.into(), &rhs.into()).unwrap()
    }

    fn big(n: i64) -> Value {
        Value::BigInt(BigInt::from(n))
    }

    fn thrown_message(result: Result<impl std::fmt::Debug, Value>) -> String {
        result.unwrap_err().error_message().unwrap()
    }

    // ===== Arithmetic =====

    #[test]
    fn test_plus_concatenates_strings() {
        assert_eq!(bin(BinaryOp::Plus, "a", 1), Value::from("a1"));
        assert_eq!(bin(BinaryOp::Plus, 1, "a"), Value::from("1a"));
        assert_eq!(bin(BinaryOp::Plus, 1, 2), Value::from(3));
        assert_eq!(
            bin(BinaryOp::Plus, Value::array(vec![Value::from(1), Value::from(2)]), "!"),
            Value::from("1,2!")
        );
    }

    #[test]
    fn test_ieee_semantics() {
        assert_eq!(bin(BinaryOp::Div, 1, 0), Value::from(f64::INFINITY));
        assert!(matches!(bin(BinaryOp::Mod, 1, 0), Value::Number(n) if n.is_nan()));
        assert_eq!(bin(BinaryOp::Mod, -7, 3), Value::from(-1));
        assert_eq!(bin(BinaryOp::Exp, 2, 10), Value::from(1024));
        assert!(matches!(
            bin(BinaryOp::Minus, Value::Undefined, 1),
            Value::Number(n) if n.is_nan()
        ));
    }

    #[test]
    fn test_bigint_arithmetic() {
        assert_eq!(bin(BinaryOp::Plus, big(2), big(3)), big(5));
        assert_eq!(bin(BinaryOp::Mul, big(-4), big(3)), big(-12));
        assert_eq!(bin(BinaryOp::Div, big(7), big(2)), big(3));
        assert_eq!(bin(BinaryOp::Exp, big(2), big(64)), {
            Value::BigInt(BigInt::from(1u128 << 64))
        });
        assert_eq!(bin(BinaryOp::LeftShift, big(1), big(70)), {
            Value::BigInt(BigInt::from(1u128 << 70))
        });
    }

    #[test]
    fn test_bigint_errors() {
        let mixed = binary(BinaryOp::Plus, &big(1), &Value::from(1));
        assert!(thrown_message(mixed).contains("Cannot mix BigInt"));

        let err = binary(BinaryOp::Div, &big(1), &big(0)).unwrap_err();
        assert_eq!(err.error_name().as_deref(), Some("RangeError"));

        let err = binary(BinaryOp::RightShiftUnsigned, &big(1), &big(1)).unwrap_err();
        assert_eq!(err.error_name().as_deref(), Some("TypeError"));
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOp::Minus, &Value::from("3")).unwrap(), Value::from(-3));
        assert_eq!(unary(UnaryOp::Not, &Value::from("")).unwrap(), Value::Bool(true));
        assert_eq!(unary(UnaryOp::BitNot, &Value::from(5)).unwrap(), Value::from(-6));
        assert_eq!(unary(UnaryOp::BitNot, &big(5)).unwrap(), big(-6));
        assert_eq!(
            unary(UnaryOp::TypeOf, &Value::Null).unwrap(),
            Value::from("object")
        );
        assert!(unary(UnaryOp::Plus, &big(1)).is_err());
    }

    // ===== Comparison =====

    #[test]
    fn test_relational() {
        assert_eq!(bin(BinaryOp::Less, 1, 2), Value::Bool(true));
        assert_eq!(bin(BinaryOp::Less, "b", "a"), Value::Bool(false));
        assert_eq!(bin(BinaryOp::LessEq, "10", 9), Value::Bool(false));
        assert_eq!(bin(BinaryOp::Greater, big(3), 2.5), Value::Bool(true));
        assert_eq!(bin(BinaryOp::GreaterEq, f64::NAN, 1), Value::Bool(false));
        assert_eq!(bin(BinaryOp::LessEq, f64::NAN, f64::NAN), Value::Bool(false));
    }

    #[test]
    fn test_equality_operators() {
        assert_eq!(bin(BinaryOp::LooseEq, "1", 1), Value::Bool(true));
        assert_eq!(bin(BinaryOp::StrictEq, "1", 1), Value::Bool(false));
        assert_eq!(bin(BinaryOp::LooseEq, Value::Null, Value::Undefined), Value::Bool(true));
        assert_eq!(bin(BinaryOp::StrictNe, Value::Null, Value::Undefined), Value::Bool(true));
        assert_eq!(
            bin(
                BinaryOp::StrictEq,
                Value::array(vec![Value::from(1)]),
                Value::array(vec![Value::from(1)])
            ),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_logical_operators_return_operands() {
        assert_eq!(bin(BinaryOp::And, 0, "x"), Value::from(0));
        assert_eq!(bin(BinaryOp::And, 1, "x"), Value::from("x"));
        assert_eq!(bin(BinaryOp::Or, "", "y"), Value::from("y"));
        assert_eq!(bin(BinaryOp::NullishCoalesce, 0, 5), Value::from(0));
        assert_eq!(bin(BinaryOp::NullishCoalesce, Value::Null, 5), Value::from(5));
    }

    // ===== Bitwise =====

    #[test]
    fn test_bitwise_uses_int32() {
        assert_eq!(bin(BinaryOp::BitOr, 4_294_967_297.0, 0), Value::from(1));
        assert_eq!(bin(BinaryOp::BitAnd, 6, 3), Value::from(2));
        assert_eq!(bin(BinaryOp::LeftShift, 1, 33), Value::from(2));
        assert_eq!(bin(BinaryOp::RightShift, -8, 1), Value::from(-4));
        assert_eq!(
            bin(BinaryOp::RightShiftUnsigned, -1, 0),
            Value::from(4_294_967_295.0)
        );
        assert_eq!(to_int32(2_147_483_648.0), -2_147_483_648);
        assert_eq!(to_uint32(-1.0), u32::MAX);
    }

    // ===== instanceof / in =====

    #[test]
    fn test_instanceof_error_builtins() {
        let type_error = Value::type_error("bad");
        let error_class = Value::Builtin(Builtin::Error);
        let type_class = Value::Builtin(Builtin::TypeError);
        let range_class = Value::Builtin(Builtin::RangeError);

        assert_eq!(instance_of(&type_error, &error_class).unwrap(), Value::Bool(true));
        assert_eq!(instance_of(&type_error, &type_class).unwrap(), Value::Bool(true));
        assert_eq!(instance_of(&type_error, &range_class).unwrap(), Value::Bool(false));
        assert!(instance_of(&type_error, &Value::from(1)).is_err());
    }

    #[test]
    fn test_in_operator() {
        let obj = Value::object([("a", Value::from(1))]);
        assert_eq!(bin(BinaryOp::In, "a", obj.clone()), Value::Bool(true));
        assert_eq!(bin(BinaryOp::In, "b", obj), Value::Bool(false));

        let arr = Value::array(vec![Value::from(1), Value::Void]);
        assert_eq!(bin(BinaryOp::In, 0, arr.clone()), Value::Bool(true));
        assert_eq!(bin(BinaryOp::In, 1, arr.clone()), Value::Bool(false));
        assert_eq!(bin(BinaryOp::In, "push", arr), Value::Bool(true));

        assert!(binary(BinaryOp::In, &Value::from("a"), &Value::from(1)).is_err());
    }

    // ===== Property access =====

    #[test]
    fn test_sub_reads() {
        let arr = Value::array(vec![Value::from(1), Value::Void]);
        assert_eq!(sub(&arr, &Value::from(0)).unwrap(), Value::from(1));
        assert_eq!(sub(&arr, &Value::from(1)).unwrap(), Value::Undefined);
        assert_eq!(sub(&arr, &Value::from(9)).unwrap(), Value::Undefined);
        assert_eq!(sub(&arr, &Value::from("length")).unwrap(), Value::from(2));
        assert!(matches!(sub(&arr, &Value::from("push")).unwrap(), Value::Native(_)));

        let s = Value::from("héllo");
        assert_eq!(sub(&s, &Value::from("length")).unwrap(), Value::from(6));
        assert_eq!(sub(&s, &Value::from(0)).unwrap(), Value::from("h"));
        assert_eq!(sub(&s, &Value::from(2)).unwrap(), Value::from(""));

        let err = sub(&Value::Undefined, &Value::from("x")).unwrap_err();
        assert!(err.error_message().unwrap().contains("reading 'x'"));
    }

    #[test]
    fn test_sub_follows_prototype() {
        let proto = Value::object([("greet", Value::from("hi"))]);
        let obj = Value::object_with_prototype([("own", Value::from(1))], proto);
        assert_eq!(sub(&obj, &Value::from("own")).unwrap(), Value::from(1));
        assert_eq!(sub(&obj, &Value::from("greet")).unwrap(), Value::from("hi"));
        assert_eq!(sub(&obj, &Value::from("missing")).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_copy_counter_accessors() {
        let counter = Value::copy_counter(Value::from("sample"));
        assert_eq!(sub(&counter, &Value::from("tag")).unwrap(), Value::from("sample"));
        assert_eq!(sub(&counter, &Value::from("count")).unwrap(), Value::from(0));
    }

    #[test]
    fn test_builtin_members() {
        let floor = sub(&Value::Builtin(Builtin::Math), &Value::from("floor")).unwrap();
        assert!(matches!(floor, Value::Native(n) if n.name == "floor"));
        let pi = sub(&Value::Builtin(Builtin::Math), &Value::from("PI")).unwrap();
        assert_eq!(pi, Value::from(std::f64::consts::PI));
    }

    #[test]
    fn test_optional_chain() {
        let obj = Value::object([("a", Value::from(1))]);
        assert_eq!(bin(BinaryOp::OptionalChain, obj, "a"), Value::from(1));
        assert_eq!(bin(BinaryOp::OptionalChain, Value::Null, "a"), Value::Undefined);
        assert_eq!(bin(BinaryOp::OptionalChain, Value::Undefined, "a"), Value::Undefined);
        assert_eq!(
            bin(BinaryOp::OptionalChain, Value::array(vec![Value::from(7)]), 0),
            Value::from(7)
        );
        // Only the target is guarded
        let inner = bin(BinaryOp::OptionalChain, Value::object([("a", Value::Null)]), "a");
        assert_eq!(inner, Value::Null);
        assert!(sub(&inner, &Value::from("b")).is_err());
    }

    // ===== Property writes =====

    #[test]
    fn test_submov_extends_with_holes() {
        let mut arr = Value::array(vec![Value::from(1)]);
        submov(&mut arr, &Value::from(3), Value::from(4)).unwrap();
        let elements = &arr.as_array().unwrap().elements;
        assert_eq!(elements.len(), 4);
        assert!(elements[1].is_void());
        assert_eq!(elements[3], Value::from(4));
    }

    #[test]
    fn test_submov_rejects_large_gap_without_copying() {
        let shared = Value::array(vec![Value::from(1)]);
        let mut arr = shared.clone();
        let before = store_stats().payload_clones;

        let err = submov(&mut arr, &Value::from(500), Value::from(1)).unwrap_err();
        assert_eq!(err.error_name().as_deref(), Some("TypeError"));
        assert_eq!(store_stats().payload_clones, before);
    }

    #[test]
    fn test_submov_copies_shared_payload_once() {
        let original = Value::array(vec![Value::from(1), Value::from(2)]);
        let mut copy = original.clone();
        let before = store_stats().payload_clones;

        submov(&mut copy, &Value::from(0), Value::from(10)).unwrap();
        submov(&mut copy, &Value::from(1), Value::from(20)).unwrap();

        assert_eq!(store_stats().payload_clones, before + 1);
        assert_eq!(original, Value::array(vec![Value::from(1), Value::from(2)]));
        assert_eq!(copy, Value::array(vec![Value::from(10), Value::from(20)]));
    }

    #[test]
    fn test_length_assignment() {
        let mut arr = Value::array(vec![Value::from(1), Value::from(2), Value::from(3)]);
        submov(&mut arr, &Value::from("length"), Value::from(1)).unwrap();
        assert_eq!(arr, Value::array(vec![Value::from(1)]));

        submov(&mut arr, &Value::from("length"), Value::from(3)).unwrap();
        assert_eq!(sub(&arr, &Value::from("length")).unwrap(), Value::from(3));

        assert!(submov(&mut arr, &Value::from("length"), Value::from(-1)).is_err());
    }

    #[test]
    fn test_submov_on_primitives_throws() {
        let mut s = Value::from("abc");
        assert!(submov(&mut s, &Value::from(0), Value::from("x")).is_err());
        let mut undefined = Value::Undefined;
        assert!(submov(&mut undefined, &Value::from("a"), Value::from(1)).is_err());
    }

    #[test]
    fn test_delete() {
        let mut obj = Value::object([
            ("a", Value::from(1)),
            ("b", Value::from(2)),
            ("c", Value::from(3)),
        ]);
        delete(&mut obj, &Value::from("b")).unwrap();
        let keys: Vec<_> = obj.as_object().unwrap().fields.keys().cloned().collect();
        assert_eq!(keys, vec!["a".to_string(), "c".to_string()]);

        let mut arr = Value::array(vec![Value::from(1), Value::from(2)]);
        delete(&mut arr, &Value::from(0)).unwrap();
        assert!(arr.as_array().unwrap().elements[0].is_void());
        assert_eq!(arr.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_increment() {
        let mut n = Value::from(1);
        increment(&mut n, 1);
        assert_eq!(n, Value::from(2));

        let mut b = big(1);
        increment(&mut b, -1);
        assert_eq!(b, big(0));

        let mut s = Value::from("4");
        increment(&mut s, 1);
        assert_eq!(s, Value::from(5));
    }
}
