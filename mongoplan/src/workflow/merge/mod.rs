//! Unification of two workflows that must feed a common downstream
//! consumer. `merge` returns the unified workflow plus a *base* for each
//! input: the reference under which that input's root document can be
//! found in the unified output.
//!
//! The pattern rows are tried top-down; a pair no row handles is retried
//! flipped (with the bases swapped back), and the fold-left fallback
//! makes the whole thing total.


use super::coalesce::coalesce;
use super::definitions::*;
use super::rewrite::rebase;
use crate::{
    expr::Expression,
    field::{DocVar, NameGen},
    js::{Expr as JsExpr, JsFn},
    value::Value,
};
use linked_hash_map::LinkedHashMap;

pub type Bases = (DocVar, DocVar);

pub fn merge(left: &Workflow, right: &Workflow, gen: &mut NameGen) -> (Bases, Workflow) {
    if left == right {
        return ((DocVar::root(), DocVar::root()), left.clone());
    }
    if let Some(merged) = try_merge(left, right, gen) {
        return merged;
    }
    if let Some(((lb, rb), unified)) = try_merge(right, left, gen) {
        return ((rb, lb), unified);
    }
    fallback(left, right, gen)
}

/// The handled pattern rows, in order. `None` means "no row matched";
/// the caller then delegates to the flipped pair.
fn try_merge(left: &Workflow, right: &Workflow, gen: &mut NameGen) -> Option<(Bases, Workflow)> {
    match (left, right) {
        (Workflow::Pure(l), Workflow::Pure(r)) => {
            let lname = gen.fresh_name();
            let rname = gen.fresh_name();
            let mut doc = LinkedHashMap::new();
            doc.insert(lname.clone(), l.value.clone());
            doc.insert(rname.clone(), r.value.clone());
            Some((
                (DocVar::field_name(lname), DocVar::field_name(rname)),
                Workflow::pure(Value::Document(doc.into())),
            ))
        }
        (Workflow::Pure(l), r) => {
            let lname = gen.fresh_name();
            let rname = gen.fresh_name();
            let mut items = LinkedHashMap::new();
            items.insert(
                lname.clone(),
                ProjectItem::Expr(Expression::literal(l.value.clone())),
            );
            items.insert(rname.clone(), ProjectItem::Expr(Expression::root()));
            Some((
                (DocVar::field_name(lname), DocVar::field_name(rname)),
                r.clone()
                    .project(Reshape::new(items.into()), IdHandling::IncludeId),
            ))
        }
        (Workflow::Group(l), Workflow::Group(r)) => merge_groups(l, r, gen),
        (Workflow::Group(_), r)
            if r.is_pipeline() && !r.resets_root() && r.source().is_some() =>
        {
            merge_under_projection(left, right, gen)
        }
        (Workflow::GeoNear(_), r)
            if r.is_pipeline()
                && !r.resets_root()
                && !matches!(r, Workflow::GeoNear(_))
                && r.source().is_some() =>
        {
            let ((lb, rb), src) = merge(left, r.source()?, gen);
            let stage = coalesce(rebase(right.clone().with_source(src), &rb));
            Some(((lb, rb), stage))
        }
        (Workflow::Project(l), r) if *l.source == *r => {
            let lname = gen.fresh_name();
            let rname = gen.fresh_name();
            let mut items = LinkedHashMap::new();
            items.insert(lname.clone(), ProjectItem::Nested(l.shape.clone()));
            items.insert(rname.clone(), ProjectItem::Expr(Expression::root()));
            Some((
                (DocVar::field_name(lname), DocVar::field_name(rname)),
                (*l.source).clone().project(
                    Reshape::new(items.into()),
                    l.id.merge(IdHandling::IncludeId),
                ),
            ))
        }
        (Workflow::Unwind(l), Workflow::Unwind(r)) => {
            let ((lb, rb), src) = merge(&l.source, &r.source, gen);
            let lf = l.field.rebase(&lb);
            let rf = r.field.rebase(&rb);
            if lf == rf {
                // the same array unwound once serves both sides
                Some(((lb, rb), src.unwind(lf)))
            } else {
                Some(((lb, rb), src.unwind(lf).unwind(rf)))
            }
        }
        (Workflow::SimpleMap(l), Workflow::SimpleMap(r)) if l.flatten.is_empty() && r.flatten.is_empty() => {
            let scope = merge_scopes(&l.scope, &r.scope).ok()?;
            let ((lb, rb), src) = merge(&l.source, &r.source, gen);
            let lname = gen.fresh_name();
            let rname = gen.fresh_name();
            let param = "__doc";
            let body = JsExpr::Obj(vec![
                (
                    lname.clone(),
                    l.expr.apply(lb.to_js(JsExpr::ident(param))),
                ),
                (
                    rname.clone(),
                    r.expr.apply(rb.to_js(JsExpr::ident(param))),
                ),
            ]);
            Some((
                (DocVar::field_name(lname), DocVar::field_name(rname)),
                src.simple_map(JsFn::new(param, body), vec![], scope),
            ))
        }
        (Workflow::SimpleMap(l), r) if l.flatten.is_empty() => {
            let ((lb, rb), src) = merge(&l.source, r, gen);
            let lname = gen.fresh_name();
            let rname = gen.fresh_name();
            let param = "__doc";
            let body = JsExpr::Obj(vec![
                (
                    lname.clone(),
                    l.expr.apply(lb.to_js(JsExpr::ident(param))),
                ),
                (rname.clone(), rb.to_js(JsExpr::ident(param))),
            ]);
            Some((
                (DocVar::field_name(lname), DocVar::field_name(rname)),
                src.simple_map(JsFn::new(param, body), vec![], l.scope.clone()),
            ))
        }
        (Workflow::Project(l), Workflow::Project(r)) => {
            let ((lb, rb), src) = merge(&l.source, &r.source, gen);
            let lshape = l.shape.clone().rewrite_refs(&|dv: &DocVar| dv.rebase(&lb));
            let rshape = r.shape.clone().rewrite_refs(&|dv: &DocVar| dv.rebase(&rb));
            match lshape.merge(&rshape) {
                Some(shape) => Some((
                    (DocVar::root(), DocVar::root()),
                    src.project(shape, l.id.merge(r.id)),
                )),
                None => {
                    let lname = gen.fresh_name();
                    let rname = gen.fresh_name();
                    let mut items = LinkedHashMap::new();
                    items.insert(lname.clone(), ProjectItem::Nested(lshape));
                    items.insert(rname.clone(), ProjectItem::Nested(rshape));
                    Some((
                        (DocVar::field_name(lname), DocVar::field_name(rname)),
                        src.project(Reshape::new(items.into()), l.id.merge(r.id)),
                    ))
                }
            }
        }
        (Workflow::Redact(l), Workflow::Redact(r)) => {
            let ((lb, rb), src) = merge(&l.source, &r.source, gen);
            let first = l.expr.clone().rewrite_refs(&|dv: &DocVar| dv.rebase(&lb));
            let second = r.expr.clone().rewrite_refs(&|dv: &DocVar| dv.rebase(&rb));
            Some(((lb, rb), src.redact(first).redact(second)))
        }
        // the generic project-beside-pipeline row: split the document into
        // the projected shape and the other branch's root, then re-parent
        // the pipeline stage onto that projection
        (Workflow::Project(l), r)
            if matches!(r, Workflow::Redact(_) | Workflow::GeoNear(_)) =>
        {
            let ((lb, rb), src) = merge(&l.source, r.source()?, gen);
            let lname = gen.fresh_name();
            let rname = gen.fresh_name();
            let lshape = l.shape.clone().rewrite_refs(&|dv: &DocVar| dv.rebase(&lb));
            let mut items = LinkedHashMap::new();
            items.insert(lname.clone(), ProjectItem::Nested(lshape));
            items.insert(rname.clone(), ProjectItem::Expr(Expression::Ref(rb)));
            let proj = src.project(
                Reshape::new(items.into()),
                l.id.merge(IdHandling::IncludeId),
            );
            let rbase = DocVar::field_name(rname);
            let stage = coalesce(rebase(r.clone().with_source(proj), &rbase));
            Some(((DocVar::field_name(lname), rbase), stage))
        }
        (Workflow::Unwind(l), r) => {
            let ((lb, rb), src) = merge(&l.source, r, gen);
            if lb == rb {
                // unwinding in place would trample the other side; split
                // the document first
                let lname = gen.fresh_name();
                let rname = gen.fresh_name();
                let mut items = LinkedHashMap::new();
                items.insert(lname.clone(), ProjectItem::Expr(Expression::Ref(lb)));
                items.insert(rname.clone(), ProjectItem::Expr(Expression::Ref(rb)));
                let lbase = DocVar::field_name(lname);
                let rbase = DocVar::field_name(rname);
                let unified = src
                    .project(Reshape::new(items.into()), IdHandling::IncludeId)
                    .unwind(l.field.rebase(&lbase));
                Some(((lbase, rbase), unified))
            } else {
                Some(((lb.clone(), rb), src.unwind(l.field.rebase(&lb))))
            }
        }
        (Workflow::Map(_), Workflow::Project(r)) => {
            let ((lb, rb), src) = merge(left, &r.source, gen);
            let lname = gen.fresh_name();
            let rname = gen.fresh_name();
            let rshape = r.shape.clone().rewrite_refs(&|dv: &DocVar| dv.rebase(&rb));
            let mut items = LinkedHashMap::new();
            items.insert(lname.clone(), ProjectItem::Expr(Expression::Ref(lb)));
            items.insert(rname.clone(), ProjectItem::Nested(rshape));
            Some((
                (DocVar::field_name(lname), DocVar::field_name(rname)),
                src.project(Reshape::new(items.into()), IdHandling::IncludeId),
            ))
        }
        (Workflow::Project(l), r) if r.is_source() => {
            let ((lb, rb), src) = merge(&l.source, r, gen);
            let lname = gen.fresh_name();
            let rname = gen.fresh_name();
            let lshape = l.shape.clone().rewrite_refs(&|dv: &DocVar| dv.rebase(&lb));
            let mut items = LinkedHashMap::new();
            items.insert(lname.clone(), ProjectItem::Nested(lshape));
            items.insert(rname.clone(), ProjectItem::Expr(Expression::Ref(rb)));
            Some((
                (DocVar::field_name(lname), DocVar::field_name(rname)),
                src.project(
                    Reshape::new(items.into()),
                    l.id.merge(IdHandling::IncludeId),
                ),
            ))
        }
        (l, r) if l.is_shape_preserving() && l.source().is_some() => {
            let ((lb, rb), src) = merge(l.source()?, r, gen);
            let stage = coalesce(rebase(left.clone().with_source(src), &lb));
            Some(((lb, rb), stage))
        }
        _ => None,
    }
}

/// Two groups over mergeable sources and the same key either union their
/// accumulators (disjoint) or group under fresh names and project back.
fn merge_groups(l: &Group, r: &Group, gen: &mut NameGen) -> Option<(Bases, Workflow)> {
    let ((lb, rb), src) = merge(&l.source, &r.source, gen);
    let lg = l.grouped.clone().rewrite_refs(&|dv: &DocVar| dv.rebase(&lb));
    let rg = r.grouped.clone().rewrite_refs(&|dv: &DocVar| dv.rebase(&rb));
    let lby = l.by.clone().rewrite_refs(&|dv: &DocVar| dv.rebase(&lb));
    let rby = r.by.clone().rewrite_refs(&|dv: &DocVar| dv.rebase(&rb));
    if lby != rby {
        return None;
    }

    let disjoint = rg.items.keys().all(|k| !lg.items.contains_key(k));
    if disjoint {
        let mut items: LinkedHashMap<_, _> =
            lg.items.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for (k, v) in rg.items.iter() {
            items.insert(k.clone(), v.clone());
        }
        return Some((
            (DocVar::root(), DocVar::root()),
            src.group(Grouped::new(items.into()), lby),
        ));
    }

    // colliding accumulator names: group both sides under fresh names and
    // project them back into the two sub-documents
    let lname = gen.fresh_name();
    let rname = gen.fresh_name();
    let mut items = LinkedHashMap::new();
    let mut lshape = LinkedHashMap::new();
    let mut rshape = LinkedHashMap::new();
    for (k, acc) in lg.items.iter() {
        let fresh = gen.fresh_name();
        items.insert(fresh.clone(), acc.clone());
        lshape.insert(
            k.clone(),
            ProjectItem::Expr(Expression::Ref(DocVar::field_name(fresh))),
        );
    }
    for (k, acc) in rg.items.iter() {
        let fresh = gen.fresh_name();
        items.insert(fresh.clone(), acc.clone());
        rshape.insert(
            k.clone(),
            ProjectItem::Expr(Expression::Ref(DocVar::field_name(fresh))),
        );
    }
    let mut outer = LinkedHashMap::new();
    outer.insert(
        lname.clone(),
        ProjectItem::Nested(Reshape::new(lshape.into())),
    );
    outer.insert(
        rname.clone(),
        ProjectItem::Nested(Reshape::new(rshape.into())),
    );
    Some((
        (DocVar::field_name(lname), DocVar::field_name(rname)),
        src.group(Grouped::new(items.into()), lby)
            .project(Reshape::new(outer.into()), IdHandling::IgnoreId),
    ))
}

/// A root-resetting left (group) beside a non-resetting pipeline stage on
/// the right: unify with the stage's source, split the document into two
/// named halves, and re-parent the stage onto the projection.
fn merge_under_projection(
    left: &Workflow,
    right: &Workflow,
    gen: &mut NameGen,
) -> Option<(Bases, Workflow)> {
    let ((lb, rb), src) = merge(left, right.source()?, gen);
    let lname = gen.fresh_name();
    let rname = gen.fresh_name();
    let mut items = LinkedHashMap::new();
    items.insert(lname.clone(), ProjectItem::Expr(Expression::Ref(lb)));
    items.insert(rname.clone(), ProjectItem::Expr(Expression::Ref(rb)));
    let proj = src.project(Reshape::new(items.into()), IdHandling::IgnoreId);
    let rbase = DocVar::field_name(rname);
    let stage = coalesce(rebase(right.clone().with_source(proj), &rbase));
    Some(((DocVar::field_name(lname), rbase), stage))
}

/// The always-applicable escape hatch: run the two workflows as a
/// fold-left, each side projected under its own fresh name.
fn fallback(left: &Workflow, right: &Workflow, gen: &mut NameGen) -> (Bases, Workflow) {
    let lname = gen.fresh_name();
    let rname = gen.fresh_name();
    let mut litems = LinkedHashMap::new();
    litems.insert(lname.clone(), ProjectItem::Expr(Expression::root()));
    let mut ritems = LinkedHashMap::new();
    ritems.insert(rname.clone(), ProjectItem::Expr(Expression::root()));
    let head = left
        .clone()
        .project(Reshape::new(litems.into()), IdHandling::IncludeId);
    let tail = right
        .clone()
        .project(Reshape::new(ritems.into()), IdHandling::IncludeId);
    (
        (DocVar::field_name(lname), DocVar::field_name(rname)),
        Workflow::fold_left(head, vec![tail]),
    )
}
