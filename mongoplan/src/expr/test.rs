use super::*;
use crate::field::FieldPath;

macro_rules! test_to_bson {
    ($func_name:ident, expected = $expected:expr, input = $input:expr,) => {
        #[test]
        fn $func_name() {
            assert_eq!($expected, $input.to_bson());
        }
    };
}

test_to_bson!(
    bare_numeric_literal,
    expected = bson::bson!(1i32),
    input = Expression::literal(Value::Int32(1)),
);

test_to_bson!(
    bare_null_literal,
    expected = bson::Bson::Null,
    input = Expression::literal(Value::Null),
);

test_to_bson!(
    string_literal_wraps,
    expected = bson::bson!({ "$literal": "x" }),
    input = Expression::literal(Value::Text("x".to_string())),
);

test_to_bson!(
    document_literal_wraps,
    expected = bson::bson!({ "$literal": { "a": 1i32 } }),
    input = Expression::literal(Value::document([("a".to_string(), Value::Int32(1))])),
);

test_to_bson!(
    field_reference,
    expected = bson::Bson::String("$a.b".to_string()),
    input = Expression::Ref(DocVar::field(
        FieldPath::name("a").extend(vec![crate::field::FieldLeaf::name("b")])
    )),
);

test_to_bson!(
    root_reference,
    expected = bson::Bson::String("$$ROOT".to_string()),
    input = Expression::root(),
);

test_to_bson!(
    operator_application,
    expected = bson::bson!({ "$add": ["$a", 1i32] }),
    input = Expression::operator(
        Operator::Add,
        vec![Expression::field("a"), Expression::literal(Value::Int32(1))],
    ),
);

#[test]
fn expression_document() {
    let mut items = linked_hash_map::LinkedHashMap::new();
    items.insert(
        "total".to_string(),
        Expression::operator(
            Operator::Multiply,
            vec![Expression::field("price"), Expression::field("qty")],
        ),
    );
    assert_eq!(
        bson::bson!({ "total": { "$multiply": ["$price", "$qty"] } }),
        Expression::Document(items.into()).to_bson()
    );
}

mod to_js {
    use super::*;

    macro_rules! test_expr_to_js {
        ($func_name:ident, expected = $expected:expr, input = $input:expr,) => {
            #[test]
            fn $func_name() {
                let rendered = $input
                    .to_js(&crate::js::Expr::ident("v"))
                    .map(|e| format!("{}", e));
                assert_eq!($expected, rendered.as_deref());
            }
        };
    }

    test_expr_to_js!(
        field_ref_projects,
        expected = Some("v.a"),
        input = Expression::field("a"),
    );

    test_expr_to_js!(
        add_folds,
        expected = Some("((v.a) + (1))"),
        input = Expression::operator(
            Operator::Add,
            vec![
                Expression::field("a"),
                Expression::literal(Value::Double(1.0))
            ],
        ),
    );

    test_expr_to_js!(
        cond_is_ternary,
        expected = Some("((v.a) ? (1) : (2))"),
        input = Expression::operator(
            Operator::Cond,
            vec![
                Expression::field("a"),
                Expression::literal(Value::Double(1.0)),
                Expression::literal(Value::Double(2.0)),
            ],
        ),
    );

    test_expr_to_js!(
        substr_has_no_js_form,
        expected = None::<&str>,
        input = Expression::operator(
            Operator::Substr,
            vec![
                Expression::field("a"),
                Expression::literal(Value::Int32(0)),
                Expression::literal(Value::Int32(2)),
            ],
        ),
    );

    test_expr_to_js!(
        redact_variable_has_no_js_form,
        expected = None::<&str>,
        input = Expression::Ref(DocVar::prune()),
    );
}

#[test]
fn rewrite_refs_prefixes() {
    let base = DocVar::field_name("l");
    let e = Expression::operator(
        Operator::Add,
        vec![Expression::field("a"), Expression::literal(Value::Int32(1))],
    );
    let rewritten = e.rewrite_refs(&|dv| dv.rebase(&base));
    assert_eq!(
        bson::bson!({ "$add": ["$l.a", 1i32] }),
        rewritten.to_bson()
    );
}

#[test]
fn substitute_refs_declines_on_missing() {
    let e = Expression::operator(
        Operator::Add,
        vec![Expression::field("a"), Expression::field("b")],
    );
    let only_a = |dv: &DocVar| {
        (dv == &DocVar::field_name("a")).then(|| Expression::literal(Value::Int32(7)))
    };
    assert_eq!(None, e.substitute_refs(&only_a));

    let both = |_: &DocVar| Some(Expression::literal(Value::Int32(7)));
    assert!(e.substitute_refs(&both).is_some());
}

#[test]
fn accumulator_serializes() {
    assert_eq!(
        bson::bson!({ "$sum": "$qty" }),
        Accumulator::new(AccumulatorOp::Sum, Expression::field("qty")).to_bson()
    );
}
