//! The canonical map/reduce function bodies and the composition wrappers
//! the coalescer and the lowering build new bodies out of.

use crate::js::{Expr, Func, Stmt};
use lazy_static::lazy_static;

lazy_static! {
    /// `function (key, value) { return [key, value]; }`
    pub static ref MAP_NOP: Func = Func {
        params: vec!["key".to_string(), "value".to_string()],
        body: vec![Stmt::Return(Expr::Arr(vec![
            Expr::ident("key"),
            Expr::ident("value"),
        ]))],
    };

    /// `function (key, values) { return values[0]; }`
    pub static ref REDUCE_NOP: Func = Func {
        params: vec!["key".to_string(), "values".to_string()],
        body: vec![Stmt::Return(
            Expr::ident("values").access(Expr::Num(0.0)),
        )],
    };

    /// The default fold-left reducer: overlay every incoming document's
    /// attributes onto the accumulated one.
    ///
    /// ```text
    /// function (key, values) {
    ///   var rez = {};
    ///   values.forEach(function (value) {
    ///     for (var attr in (value)) { rez[attr] = value[attr]; }
    ///   });
    ///   return rez;
    /// }
    /// ```
    pub static ref REDUCE_FOLD_LEFT: Func = Func {
        params: vec!["key".to_string(), "values".to_string()],
        body: vec![
            Stmt::VarDef("rez".to_string(), Some(Expr::Obj(vec![]))),
            Stmt::Expr(
                Expr::ident("values").select("forEach").call(vec![Expr::Fun(Func {
                    params: vec!["value".to_string()],
                    body: vec![Stmt::ForIn(
                        "attr".to_string(),
                        Expr::ident("value"),
                        vec![Stmt::Assign(
                            Expr::ident("rez").access(Expr::ident("attr")),
                            Expr::ident("value").access(Expr::ident("attr")),
                        )],
                    )],
                })]),
            ),
            Stmt::Return(Expr::ident("rez")),
        ],
    };
}

fn key_value_params() -> Vec<String> {
    vec!["key".to_string(), "value".to_string()]
}

fn apply_pair(f: &Func, pair: Expr) -> Expr {
    Expr::Fun(f.clone())
        .select("apply")
        .call(vec![Expr::Null, pair])
}

fn call_kv(f: &Func) -> Expr {
    Expr::Fun(f.clone()).call(vec![Expr::ident("key"), Expr::ident("value")])
}

/// `Map` after `Map`: run `inner`, splat its pair into `outer`.
///
/// `function (key, value) { return outer.apply(null, inner(key, value)); }`
pub fn compose_map(outer: &Func, inner: &Func) -> Func {
    Func {
        params: key_value_params(),
        body: vec![Stmt::Return(apply_pair(outer, call_kv(inner)))],
    }
}

/// `FlatMap` after `Map`: the inner pair feeds the outer directly, whose
/// result is already a list.
pub fn flat_map_after_map(outer: &Func, inner: &Func) -> Func {
    compose_map(outer, inner)
}

/// `Map` after `FlatMap`: map the outer over each emitted pair.
///
/// `function (key, value) {
///    return inner(key, value).map(function (__pair) {
///      return outer.apply(null, __pair); }); }`
pub fn map_after_flat_map(outer: &Func, inner: &Func) -> Func {
    Func {
        params: key_value_params(),
        body: vec![Stmt::Return(
            call_kv(inner).select("map").call(vec![Expr::Fun(Func {
                params: vec!["__pair".to_string()],
                body: vec![Stmt::Return(apply_pair(outer, Expr::ident("__pair")))],
            })]),
        )],
    }
}

/// `FlatMap` after `FlatMap`: Kleisli composition over the array monad.
///
/// `function (key, value) {
///    return [].concat.apply([], inner(key, value).map(function (__pair) {
///      return outer.apply(null, __pair); })); }`
pub fn flat_map_after_flat_map(outer: &Func, inner: &Func) -> Func {
    Func {
        params: key_value_params(),
        body: vec![Stmt::Return(
            Expr::Arr(vec![]).select("concat").select("apply").call(vec![
                Expr::Arr(vec![]),
                call_kv(inner).select("map").call(vec![Expr::Fun(Func {
                    params: vec!["__pair".to_string()],
                    body: vec![Stmt::Return(apply_pair(outer, Expr::ident("__pair")))],
                })]),
            ]),
        )],
    }
}

/// Lift a single-pair map body into list-of-pairs convention.
///
/// `function (key, value) { return [f(key, value)]; }`
pub fn lift_map(f: &Func) -> Func {
    Func {
        params: key_value_params(),
        body: vec![Stmt::Return(Expr::Arr(vec![call_kv(f)]))],
    }
}

/// A map body that narrows the incoming document to `path` before
/// emitting; used when a crushed child left its content under a base.
///
/// `function (key, value) { return [key, value.<path>]; }`
pub fn map_project(path: &crate::field::FieldPath) -> Func {
    Func {
        params: key_value_params(),
        body: vec![Stmt::Return(Expr::Arr(vec![
            Expr::ident("key"),
            path.to_js(Expr::ident("value")),
        ]))],
    }
}
