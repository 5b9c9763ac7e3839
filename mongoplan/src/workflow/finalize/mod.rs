//! Irreversible shape normalizations applied once, after plan assembly:
//! unused projected fields are erased, map-reduce sources are lowered to
//! raw JS form, fold-lefts get their canonical head/tail shape, and a
//! known output shape is promoted to a final projection.

#[cfg(test)]
mod test;

use super::coalesce::coalesce;
use super::definitions::*;
use super::funcs;
use super::rewrite::stage_refs;
use crate::{
    expr::Expression,
    field::{DocVar, EXPR_LABEL},
    js::{Expr as JsExpr, Func, JsFn, Stmt},
    value::Value,
};
use linked_hash_map::LinkedHashMap;
use std::collections::BTreeSet;

pub fn finalize(wf: Workflow) -> Workflow {
    promote_shape(finalize0(finish(wf)))
}

/// `finalize` minus the shape promotion, for callers that want the raw
/// output shape preserved.
pub fn finalize_preserving(wf: Workflow) -> Workflow {
    finalize0(finish(wf))
}

/// Erase projected fields that nothing downstream reads.
fn finish(wf: Workflow) -> Workflow {
    delete_unused_fields(wf, None)
}

/// `used` is the set of references read above this node; `None` means
/// everything may be read (the root of the plan, or below an opaque JS
/// stage).
fn delete_unused_fields(op: Workflow, used: Option<&BTreeSet<DocVar>>) -> Workflow {
    match op {
        Workflow::Project(p) => {
            let shape = match used {
                Some(set) => prune_shape(p.shape, set),
                None => p.shape,
            };
            let node = Workflow::Project(Project {
                source: p.source,
                shape,
                id: p.id,
            });
            let below: BTreeSet<DocVar> = stage_refs(&node).into_iter().collect();
            push_into_source(node, Some(below))
        }
        node @ Workflow::Group(_) => {
            let below: BTreeSet<DocVar> = stage_refs(&node).into_iter().collect();
            push_into_source(node, Some(below))
        }
        Workflow::FoldLeft(f) => Workflow::FoldLeft(FoldLeft {
            head: Box::new(delete_unused_fields(*f.head, None)),
            tail: f
                .tail
                .into_iter()
                .map(|t| delete_unused_fields(t, None))
                .collect(),
        }),
        Workflow::Join(j) => Workflow::Join(Join {
            sources: j
                .sources
                .into_iter()
                .map(|s| delete_unused_fields(s, None))
                .collect(),
        }),
        node @ (Workflow::Map(_)
        | Workflow::FlatMap(_)
        | Workflow::SimpleMap(_)
        | Workflow::Reduce(_)) => {
            // JS bodies are opaque; assume they read everything
            push_into_source(node, None)
        }
        node @ (Workflow::Pure(_) | Workflow::Read(_)) => node,
        node => {
            // shape-preserving stages, unwind, redact, geonear: pass the
            // used set down, extended by this stage's own reads
            let below = used.map(|set| {
                let mut below = set.clone();
                below.extend(stage_refs(&node));
                below
            });
            push_into_source(node, below)
        }
    }
}

fn push_into_source(node: Workflow, below: Option<BTreeSet<DocVar>>) -> Workflow {
    node.map_source(|src| delete_unused_fields(src, below.as_ref()))
}

/// Keep only the shape fields some downstream reference overlaps. An
/// all-unused shape is left intact rather than made empty.
fn prune_shape(shape: Reshape, used: &BTreeSet<DocVar>) -> Reshape {
    let keep = |name: &String| {
        let def = DocVar::field_name(name.clone());
        used.iter()
            .any(|r| r.starts_with(&def) || def.starts_with(r))
    };
    if shape.keys().any(|k| !keep(k)) {
        let pruned = shape.items.clone().retain_keys(|k| keep(k));
        if pruned.is_empty() {
            Reshape::new(shape.items)
        } else {
            Reshape::new(pruned)
        }
    } else {
        shape
    }
}

/// Normalize map-reduce sources and fold-left shape, bottom-up.
fn finalize0(op: Workflow) -> Workflow {
    let op = map_children(op, &finalize0);
    finalize0_local(op)
}

fn finalize0_local(op: Workflow) -> Workflow {
    if op.is_map_reduce() {
        // the synthesized replacement may itself sit over a convertible
        // source, so it goes through this normalization too
        let converted = match op.source() {
            Some(Workflow::Project(p)) => {
                p.shape
                    .to_js(&JsExpr::ident("__doc"))
                    .map(|body| {
                        finalize0_local(Workflow::SimpleMap(SimpleMap {
                            source: p.source.clone(),
                            expr: JsFn::new("__doc", body),
                            flatten: vec![],
                            scope: Scope::new(),
                        }))
                    })
            }
            Some(Workflow::Unwind(u)) => Some(finalize0_local(Workflow::SimpleMap(SimpleMap {
                source: u.source.clone(),
                expr: JsFn::identity(),
                flatten: vec![JsFn::new("__doc", u.field.to_js(JsExpr::ident("__doc")))],
                scope: Scope::new(),
            }))),
            Some(Workflow::SimpleMap(sm)) => Some(finalize0_local(simple_map_raw(sm.clone()))),
            _ => None,
        };
        match converted {
            Some(inner) => finalize0_local(coalesce(op.with_source(inner))),
            None => op,
        }
    } else if let Workflow::FoldLeft(f) = op {
        finalize_fold_left(f)
    } else {
        op
    }
}

/// Lower a `SimpleMap` to its raw `Map` (no flattens) or `FlatMap` form.
pub(crate) fn simple_map_raw(sm: SimpleMap) -> Workflow {
    if sm.flatten.is_empty() {
        // function (key, value) { return [key, expr(value)]; }
        let func = Func {
            params: vec!["key".to_string(), "value".to_string()],
            body: vec![Stmt::Return(JsExpr::Arr(vec![
                JsExpr::ident("key"),
                sm.expr.apply(JsExpr::ident("value")),
            ]))],
        };
        Workflow::Map(Map {
            source: sm.source,
            func,
            scope: sm.scope,
        })
    } else {
        Workflow::FlatMap(FlatMap {
            func: flatten_func(&sm.expr, &sm.flatten),
            source: sm.source,
            scope: sm.scope,
        })
    }
}

/// The raw flattening body: one nested loop per flatten, a fresh shallow
/// clone per combination with each flattened location replaced by the
/// current element, then the mapped document is emitted under a fresh key.
fn flatten_func(expr: &JsFn, flattens: &[JsFn]) -> Func {
    let value = JsExpr::ident("value");
    let each = JsExpr::ident("__each");

    let mut innermost = vec![
        Stmt::VarDef("__each".to_string(), Some(JsExpr::Obj(vec![]))),
        Stmt::ForIn(
            "__attr".to_string(),
            value.clone(),
            vec![Stmt::Assign(
                each.clone().access(JsExpr::ident("__attr")),
                value.clone().access(JsExpr::ident("__attr")),
            )],
        ),
    ];
    for (i, f) in flattens.iter().enumerate() {
        innermost.push(Stmt::Assign(
            f.apply(each.clone()),
            f.apply(value.clone()).access(JsExpr::ident(format!("__idx{}", i))),
        ));
    }
    innermost.push(Stmt::Expr(JsExpr::ident("rez").select("push").call(vec![
        JsExpr::Arr(vec![
            JsExpr::ident("ObjectId").call(vec![]),
            expr.apply(each),
        ]),
    ])));

    let mut body = innermost;
    for (i, f) in flattens.iter().enumerate().rev() {
        body = vec![Stmt::ForIn(
            format!("__idx{}", i),
            f.apply(value.clone()),
            body,
        )];
    }

    let mut stmts = vec![Stmt::VarDef("rez".to_string(), Some(JsExpr::Arr(vec![])))];
    stmts.extend(body);
    stmts.push(Stmt::Return(JsExpr::ident("rez")));
    Func {
        params: vec!["key".to_string(), "value".to_string()],
        body: stmts,
    }
}

/// Wrap the head so every row lands under the expression label, and make
/// sure each tail entry ends in a reduce.
fn finalize_fold_left(f: FoldLeft) -> Workflow {
    let head = if is_expr_wrapped(&f.head) {
        f.head
    } else {
        let mut items = LinkedHashMap::new();
        items.insert(
            EXPR_LABEL.to_string(),
            ProjectItem::Expr(Expression::root()),
        );
        Box::new(Workflow::Project(Project {
            source: f.head,
            shape: Reshape::new(items.into()),
            id: IdHandling::IncludeId,
        }))
    };
    let tail = f
        .tail
        .into_iter()
        .map(|entry| {
            if matches!(entry, Workflow::Reduce(_)) {
                entry
            } else {
                Workflow::Reduce(Reduce {
                    source: Box::new(entry),
                    func: funcs::REDUCE_FOLD_LEFT.clone(),
                    scope: Scope::new(),
                })
            }
        })
        .collect();
    Workflow::FoldLeft(FoldLeft { head, tail })
}

fn is_expr_wrapped(head: &Workflow) -> bool {
    match head {
        Workflow::Project(p) if p.id == IdHandling::IncludeId => {
            let mut keys = p.shape.keys();
            match (keys.next(), keys.next()) {
                (Some(k), None) if k == EXPR_LABEL => {
                    p.shape.items.get(&EXPR_LABEL.to_string())
                        == Some(&ProjectItem::Expr(Expression::root()))
                }
                _ => false,
            }
        }
        _ => false,
    }
}

fn map_children(op: Workflow, f: &impl Fn(Workflow) -> Workflow) -> Workflow {
    match op {
        Workflow::FoldLeft(fl) => Workflow::FoldLeft(FoldLeft {
            head: Box::new(f(*fl.head)),
            tail: fl.tail.into_iter().map(f).collect(),
        }),
        Workflow::Join(j) => Workflow::Join(Join {
            sources: j.sources.into_iter().map(f).collect(),
        }),
        node @ (Workflow::Pure(_) | Workflow::Read(_)) => node,
        node => node.map_source(f),
    }
}

/// When the top of the plan has a statically known shape, pin it with a
/// final inclusion projection so the driver sees exactly those fields.
fn promote_shape(wf: Workflow) -> Workflow {
    match simple_shape(&wf) {
        Some(keys) => wf.project(Reshape::including(keys), IdHandling::IgnoreId),
        None => wf,
    }
}

/// The output field names, when they are statically known.
fn simple_shape(op: &Workflow) -> Option<Vec<String>> {
    match op {
        Workflow::Pure(p) => match &p.value {
            Value::Document(d) => Some(d.keys().cloned().collect()),
            _ => None,
        },
        Workflow::Project(p) => Some(p.shape.keys().cloned().collect()),
        Workflow::SimpleMap(sm) => match &sm.expr.body {
            JsExpr::Obj(fields) => Some(fields.iter().map(|(k, _)| k.clone()).collect()),
            _ => None,
        },
        Workflow::Group(g) => {
            let mut keys: Vec<String> = g.grouped.keys().cloned().collect();
            keys.push(crate::field::ID_LABEL.to_string());
            Some(keys)
        }
        op if op.is_shape_preserving() => simple_shape(op.source()?),
        _ => None,
    }
}
