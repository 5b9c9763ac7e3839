use super::*;

macro_rules! test_round_trip {
    ($func_name:ident, input = $input:expr,) => {
        #[test]
        fn $func_name() {
            let input: Value = $input;
            assert_eq!(input, Value::from_repr(input.to_repr()));
        }
    };
}

test_round_trip!(double, input = Value::Double(4.2),);
test_round_trip!(text, input = Value::Text("hello".to_string()),);
test_round_trip!(
    document_preserves_order,
    input = Value::document([
        ("z".to_string(), Value::Int32(1)),
        ("a".to_string(), Value::Int32(2)),
    ]),
);
test_round_trip!(
    array,
    input = Value::Array(vec![Value::Null, Value::Bool(true)]),
);
test_round_trip!(binary, input = Value::Binary(vec![0, 1, 2, 255]),);
test_round_trip!(bool_value, input = Value::Bool(false),);
test_round_trip!(date, input = Value::Date(1500000000000),);
test_round_trip!(null, input = Value::Null,);
test_round_trip!(regex, input = Value::Regex("^a.*$".to_string()),);
test_round_trip!(symbol, input = Value::Symbol("sym".to_string()),);
test_round_trip!(int32, input = Value::Int32(-7),);
test_round_trip!(timestamp, input = Value::Timestamp(1400000000, 3),);
test_round_trip!(int64, input = Value::Int64(1 << 40),);
test_round_trip!(min_key, input = Value::MinKey,);
test_round_trip!(max_key, input = Value::MaxKey,);

#[test]
fn object_id_round_trip() {
    // scenario: hex in, wire form, byte-identical back
    let oid = Value::object_id_from_hex("507f1f77bcf86cd799439011").unwrap();
    assert_eq!(oid, Value::from_repr(oid.to_repr()));
    assert_eq!(
        Value::ObjectId([
            0x50, 0x7f, 0x1f, 0x77, 0xbc, 0xf8, 0x6c, 0xd7, 0x99, 0x43, 0x90, 0x11
        ]),
        oid
    );
}

#[test]
fn object_id_rejects_bad_hex() {
    assert_eq!(
        Err(Error::InvalidObjectIdHex("nothex".to_string())),
        Value::object_id_from_hex("nothex")
    );
}

#[test]
fn na_has_no_type_code_and_reads_back_from_undefined() {
    assert_eq!(None, Value::NA.type_code());
    assert_eq!(bson::Bson::Undefined, Value::NA.to_repr());
    assert_eq!(Value::NA, Value::from_repr(bson::Bson::Undefined));
}

#[test]
fn type_codes_match_wire_table() {
    assert_eq!(Some(1), Value::Double(0.0).type_code());
    assert_eq!(Some(3), Value::document(std::iter::empty()).type_code());
    assert_eq!(Some(10), Value::Null.type_code());
    assert_eq!(Some(17), Value::Timestamp(0, 0).type_code());
    assert_eq!(Some(255), Value::MinKey.type_code());
    assert_eq!(Some(127), Value::MaxKey.type_code());
}

#[test]
fn uuid_halves_are_reversed_lsb_first() {
    let uuid = uuid::Uuid::from_bytes([
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, //
        0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    ]);
    assert_eq!(
        Value::Binary(vec![
            0x0f, 0x0e, 0x0d, 0x0c, 0x0b, 0x0a, 0x09, 0x08, //
            0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, 0x00,
        ]),
        Value::from_uuid(uuid)
    );
}

mod js_rendering {
    use super::*;

    macro_rules! test_to_js {
        ($func_name:ident, expected = $expected:expr, input = $input:expr,) => {
            #[test]
            fn $func_name() {
                assert_eq!($expected, format!("{}", $input.to_js()));
            }
        };
    }

    test_to_js!(
        object_id_constructor,
        expected = "ObjectId(\"507f1f77bcf86cd799439011\")",
        input = Value::object_id_from_hex("507f1f77bcf86cd799439011").unwrap(),
    );
    test_to_js!(
        int32_constructor,
        expected = "NumberInt(\"-7\")",
        input = Value::Int32(-7),
    );
    test_to_js!(
        int64_constructor,
        expected = "NumberLong(\"42\")",
        input = Value::Int64(42),
    );
    test_to_js!(
        timestamp_constructor,
        expected = "Timestamp(1400000000, 3)",
        input = Value::Timestamp(1400000000, 3),
    );
    test_to_js!(min_key_literal, expected = "MinKey", input = Value::MinKey,);
    test_to_js!(max_key_literal, expected = "MaxKey", input = Value::MaxKey,);
    test_to_js!(na_is_undefined, expected = "undefined", input = Value::NA,);
    test_to_js!(
        document_literal,
        expected = "{a: 1}",
        input = Value::document([("a".to_string(), Value::Double(1.0))]),
    );

    #[test]
    fn javascript_scope_rendering_drops_scope() {
        let mut scope = linked_hash_map::LinkedHashMap::new();
        scope.insert("x".to_string(), Value::Int32(1));
        let v = Value::JavaScriptScope(js::Expr::ident("x"), scope.into());
        assert_eq!("x", format!("{}", v.to_js()));
    }
}
