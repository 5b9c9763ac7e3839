use super::*;
use crate::field::{FieldLeaf, FieldPath};

macro_rules! test_to_bson {
    ($func_name:ident, expected = $expected:expr, input = $input:expr,) => {
        #[test]
        fn $func_name() {
            assert_eq!($expected, $input.to_bson());
        }
    };
}

test_to_bson!(
    eq_renders_bare,
    expected = bson::doc! { "a": 1i32 },
    input = Selector::eq(FieldPath::name("a"), Value::Int32(1)),
);

test_to_bson!(
    range_conditions_share_a_field_document,
    expected = bson::doc! { "a": { "$gt": 1i32, "$lt": 10i32 } },
    input = Selector::Doc(vec![
        (FieldPath::name("a"), Condition::Gt(Value::Int32(1))),
        (FieldPath::name("a"), Condition::Lt(Value::Int32(10))),
    ]),
);

test_to_bson!(
    equality_after_a_range_condition_merges,
    expected = bson::doc! { "a": { "$gt": 1i32, "$eq": 5i32 } },
    input = Selector::Doc(vec![
        (FieldPath::name("a"), Condition::Gt(Value::Int32(1))),
        (FieldPath::name("a"), Condition::Eq(Value::Int32(5))),
    ]),
);

test_to_bson!(
    equality_before_a_range_condition_merges,
    expected = bson::doc! { "a": { "$eq": 5i32, "$lt": 10i32 }, "b": 2i32 },
    input = Selector::Doc(vec![
        (FieldPath::name("a"), Condition::Eq(Value::Int32(5))),
        (FieldPath::name("b"), Condition::Eq(Value::Int32(2))),
        (FieldPath::name("a"), Condition::Lt(Value::Int32(10))),
    ]),
);

test_to_bson!(
    where_clause,
    expected = bson::doc! { "$where": "this.a" },
    input = Selector::where_js(crate::js::Expr::This.select("a")),
);

test_to_bson!(
    nested_field_key,
    expected = bson::doc! { "a.b": { "$exists": true } },
    input = Selector::Doc(vec![(
        FieldPath::name("a").extend(vec![FieldLeaf::name("b")]),
        Condition::Exists(true),
    )]),
);

test_to_bson!(
    or_of_docs,
    expected = bson::doc! { "$or": [{ "a": 1i32 }, { "b": 2i32 }] },
    input = Selector::Or(vec![
        Selector::eq(FieldPath::name("a"), Value::Int32(1)),
        Selector::eq(FieldPath::name("b"), Value::Int32(2)),
    ]),
);

mod and {
    use super::*;

    #[test]
    fn disjoint_docs_fuse() {
        let merged = Selector::eq(FieldPath::name("a"), Value::Int32(1))
            .and(Selector::eq(FieldPath::name("b"), Value::Int32(2)));
        assert_eq!(
            Selector::Doc(vec![
                (FieldPath::name("a"), Condition::Eq(Value::Int32(1))),
                (FieldPath::name("b"), Condition::Eq(Value::Int32(2))),
            ]),
            merged
        );
    }

    #[test]
    fn overlapping_docs_stay_separate_under_and() {
        let merged = Selector::eq(FieldPath::name("a"), Value::Int32(1))
            .and(Selector::eq(FieldPath::name("a"), Value::Int32(2)));
        assert_eq!(
            Selector::And(vec![
                Selector::eq(FieldPath::name("a"), Value::Int32(1)),
                Selector::eq(FieldPath::name("a"), Value::Int32(2)),
            ]),
            merged
        );
    }

    #[test]
    fn nested_ands_flatten() {
        let l = Selector::eq(FieldPath::name("a"), Value::Int32(1))
            .and(Selector::eq(FieldPath::name("a"), Value::Int32(2)));
        let merged = l.and(Selector::where_js(crate::js::Expr::Bool(true)));
        match merged {
            Selector::And(parts) => assert_eq!(3, parts.len()),
            other => panic!("expected $and, got {:?}", other),
        }
    }
}

mod pipelineable {
    use super::*;

    #[test]
    fn plain_doc_is_pipelineable() {
        assert!(Selector::eq(FieldPath::name("a"), Value::Int32(1)).is_pipelineable());
    }

    #[test]
    fn where_is_not() {
        assert!(!Selector::where_js(crate::js::Expr::Bool(true)).is_pipelineable());
    }

    #[test]
    fn where_inside_compound_is_not() {
        let s = Selector::Or(vec![
            Selector::eq(FieldPath::name("a"), Value::Int32(1)),
            Selector::where_js(crate::js::Expr::Bool(true)),
        ]);
        assert!(!s.is_pipelineable());
    }

    #[test]
    fn where_inside_elem_match_is_not() {
        let s = Selector::Doc(vec![(
            FieldPath::name("xs"),
            Condition::ElemMatch(Box::new(Selector::where_js(crate::js::Expr::Bool(true)))),
        )]);
        assert!(!s.is_pipelineable());
    }
}

#[test]
fn rewrite_fields_prefixes_keys() {
    let base = FieldPath::name("l");
    let s = Selector::eq(FieldPath::name("a"), Value::Int32(1))
        .rewrite_fields(&|p| base.concat(&p));
    assert_eq!(bson::doc! { "l.a": 1i32 }, s.to_bson());
}

#[test]
fn rewrite_where_this_projects_base() {
    let s = Selector::where_js(crate::js::Expr::This.select("a"))
        .rewrite_where_this(&FieldPath::name("l"));
    assert_eq!(bson::doc! { "$where": "this.l.a" }, s.to_bson());
}
