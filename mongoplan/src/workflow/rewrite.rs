//! Reference rewriting over stage payloads: the machinery `merge` and
//! `crush` use to transplant a stage under a new base.

use super::definitions::*;
use crate::field::{DocVar, FieldPath};

/// Apply a reference rewrite to the payload of the outermost node. The
/// function is partial in effect: node kinds that hold no rewritable
/// references (sources, JS stages, composers) come back unchanged, as do
/// `$where` bodies, which only [`rebase`] knows how to move.
pub(crate) fn rewrite_refs(op: Workflow, f: &impl Fn(&DocVar) -> DocVar) -> Workflow {
    let field = |p: FieldPath| -> FieldPath {
        match f(&DocVar::field(p.clone())) {
            DocVar {
                name,
                path: Some(new),
            } if name == DocVar::ROOT_NAME => new,
            _ => p,
        }
    };

    match op {
        Workflow::Match(op) => Workflow::Match(Match {
            source: op.source,
            predicate: op.predicate.rewrite_fields(&field),
        }),
        Workflow::Project(op) => Workflow::Project(Project {
            source: op.source,
            shape: op.shape.rewrite_refs(f),
            id: op.id,
        }),
        Workflow::Group(op) => Workflow::Group(Group {
            source: op.source,
            grouped: op.grouped.rewrite_refs(f),
            by: op.by.rewrite_refs(f),
        }),
        Workflow::Redact(op) => Workflow::Redact(Redact {
            source: op.source,
            expr: op.expr.rewrite_refs(f),
        }),
        Workflow::Unwind(op) => Workflow::Unwind(Unwind {
            source: op.source,
            field: f(&op.field),
        }),
        Workflow::Sort(op) => Workflow::Sort(Sort {
            source: op.source,
            specs: op.specs.into_iter().map(|s| s.map_field(&field)).collect(),
        }),
        Workflow::GeoNear(op) => {
            let GeoNear {
                source,
                near,
                distance_field,
                limit,
                max_distance,
                query,
                spherical,
                distance_multiplier,
                include_locs,
                unique_docs,
            } = op;
            Workflow::GeoNear(GeoNear {
                source,
                near,
                distance_field: field(distance_field),
                limit,
                max_distance,
                query: query.map(|q| q.rewrite_fields(&field)),
                spherical,
                distance_multiplier,
                include_locs: include_locs.map(&field),
                unique_docs,
            })
        }
        other => other,
    }
}

/// Transplant a stage under `base`: every field reference `r` becomes
/// `base \\ r`. `$where` bodies see the document as `this`, so they are
/// moved by substituting `this.<base>` for `this`.
pub(crate) fn rebase(op: Workflow, base: &DocVar) -> Workflow {
    if base.is_root() {
        return op;
    }
    let op = rewrite_refs(op, &|dv: &DocVar| dv.rebase(base));
    match (op, &base.path) {
        (Workflow::Match(m), Some(path)) => Workflow::Match(Match {
            source: m.source,
            predicate: m.predicate.rewrite_where_this(path),
        }),
        (op, _) => op,
    }
}

/// Every reference the stage payload reads, for the unused-field
/// analysis. JS stages are opaque and intentionally absent; the caller
/// treats them as using everything.
pub(crate) fn stage_refs(op: &Workflow) -> Vec<DocVar> {
    let mut out = Vec::new();
    match op {
        Workflow::Match(op) => {
            collect_selector_fields(&op.predicate, &mut out);
        }
        Workflow::Project(op) => op.shape.collect_refs(&mut out),
        Workflow::Group(op) => {
            for (_, acc) in op.grouped.items.iter() {
                acc.expr.collect_refs(&mut out);
            }
            op.by.collect_refs(&mut out);
        }
        Workflow::Redact(op) => op.expr.collect_refs(&mut out),
        Workflow::Unwind(op) => out.push(op.field.clone()),
        Workflow::Sort(op) => {
            for spec in &op.specs {
                out.push(DocVar::field(spec.field().clone()));
            }
        }
        Workflow::GeoNear(op) => {
            if let Some(q) = &op.query {
                collect_selector_fields(q, &mut out);
            }
        }
        _ => {}
    }
    out
}

fn collect_selector_fields(sel: &crate::selector::Selector, out: &mut Vec<DocVar>) {
    use crate::selector::Selector::*;
    match sel {
        Doc(conds) => {
            for (path, _) in conds {
                out.push(DocVar::field(path.clone()));
            }
        }
        And(ss) | Or(ss) | Nor(ss) => {
            for s in ss {
                collect_selector_fields(s, out);
            }
        }
        Where(_) => {}
    }
}
