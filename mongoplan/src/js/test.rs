use super::*;

macro_rules! test_render {
    ($func_name:ident, expected = $expected:expr, input = $input:expr,) => {
        #[test]
        fn $func_name() {
            assert_eq!($expected, format!("{}", $input));
        }
    };
}

test_render!(
    select_chain,
    expected = "this.a.b",
    input = Expr::This.select("a").select("b"),
);

test_render!(
    select_non_ident_key_uses_brackets,
    expected = "this[\"a b\"]",
    input = Expr::This.select("a b"),
);

test_render!(
    access_index,
    expected = "value.a[3]",
    input = Expr::ident("value").select("a").access(Expr::Num(3.0)),
);

test_render!(
    integral_num_renders_without_fraction,
    expected = "42",
    input = Expr::Num(42.0),
);

test_render!(
    string_escapes,
    expected = "\"a\\\"b\\\\c\"",
    input = Expr::str("a\"b\\c"),
);

test_render!(
    anon_fun,
    expected = "function (key, value) { return [key, value]; }",
    input = Expr::Fun(Func {
        params: vec!["key".to_string(), "value".to_string()],
        body: vec![Stmt::Return(Expr::Arr(vec![
            Expr::ident("key"),
            Expr::ident("value"),
        ]))],
    }),
);

test_render!(
    for_in_loop,
    expected = "for (var attr in (value)) { rez[attr] = value[attr]; }",
    input = Stmt::ForIn(
        "attr".to_string(),
        Expr::ident("value"),
        vec![Stmt::Assign(
            Expr::ident("rez").access(Expr::ident("attr")),
            Expr::ident("value").access(Expr::ident("attr")),
        )],
    ),
);

test_render!(
    fun_literal_call_parenthesized,
    expected = "(function (x) { return x; })(7)",
    input = Expr::Fun(Func {
        params: vec!["x".to_string()],
        body: vec![Stmt::Return(Expr::ident("x"))],
    })
    .call(vec![Expr::Num(7.0)]),
);

mod subst {
    use super::*;

    #[test]
    fn apply_substitutes_param() {
        let f = JsFn::new("x", Expr::ident("x").select("a"));
        assert_eq!(Expr::This.select("a"), f.apply(Expr::This));
    }

    #[test]
    fn apply_leaves_other_idents() {
        let f = JsFn::new("x", Expr::ident("y").select("a"));
        assert_eq!(Expr::ident("y").select("a"), f.apply(Expr::This));
    }

    #[test]
    fn fun_param_shadows() {
        let inner = Expr::Fun(Func {
            params: vec!["x".to_string()],
            body: vec![Stmt::Return(Expr::ident("x"))],
        });
        let f = JsFn::new("x", inner.clone().call(vec![Expr::ident("x")]));
        assert_eq!(inner.call(vec![Expr::Null]), f.apply(Expr::Null));
    }

    #[test]
    fn and_then_composes() {
        let first = JsFn::new("x", Expr::ident("x").select("a"));
        let second = JsFn::new("y", Expr::ident("y").select("b"));
        let composed = first.and_then(&second);
        assert_eq!(Expr::This.select("a").select("b"), composed.apply(Expr::This));
    }

    #[test]
    fn identity_recognized() {
        assert!(JsFn::identity().is_identity());
        assert!(!JsFn::new("x", Expr::ident("x").select("a")).is_identity());
    }
}
