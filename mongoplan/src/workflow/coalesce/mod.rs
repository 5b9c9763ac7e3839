//! Local algebraic simplification, applied by every smart constructor.
//! `coalesce` inspects only the outermost node and its single child and
//! either rewrites to an equivalent term or returns the input unchanged.
//! Rewrites that cannot be performed safely (unresolvable references,
//! scope conflicts) decline and keep the original term.


use super::definitions::*;
use super::funcs;
use crate::{
    expr::{Accumulator, Expression},
    field::{DocVar, FieldLeaf, FieldPath},
    value::Value,
};
use linked_hash_map::LinkedHashMap;

pub(crate) fn coalesce(op: Workflow) -> Workflow {
    match op {
        Workflow::Match(outer) => coalesce_match(outer),
        Workflow::Limit(outer) => coalesce_limit(outer),
        Workflow::Skip(outer) => coalesce_skip(outer),
        Workflow::Project(outer) => coalesce_project(outer),
        Workflow::Group(outer) => coalesce_group(outer),
        Workflow::Out(outer) => coalesce_out(outer),
        Workflow::Map(outer) => coalesce_map(outer),
        Workflow::FlatMap(outer) => coalesce_flat_map(outer),
        Workflow::SimpleMap(outer) => coalesce_simple_map(outer),
        Workflow::FoldLeft(outer) => coalesce_fold_left(outer),
        // FIXME: two adjacent $geoNear stages could merge parameters, but
        // which combination is equivalent is unresolved; leave them be.
        other => other,
    }
}

fn coalesce_match(outer: Match) -> Workflow {
    let Match { source, predicate } = outer;
    match *source {
        // adjacent matches conjoin, earlier selector first
        Workflow::Match(inner) => Workflow::Match(Match {
            source: inner.source,
            predicate: inner.predicate.and(predicate),
        }),
        // selection happens before sorting, never the other way
        Workflow::Sort(inner) => Workflow::Sort(Sort {
            source: Box::new(coalesce(Workflow::Match(Match {
                source: inner.source,
                predicate,
            }))),
            specs: inner.specs,
        }),
        other => Workflow::Match(Match {
            source: Box::new(other),
            predicate,
        }),
    }
}

fn coalesce_limit(outer: Limit) -> Workflow {
    let Limit { source, limit } = outer;
    match *source {
        Workflow::Limit(inner) => Workflow::Limit(Limit {
            source: inner.source,
            limit: limit.min(inner.limit),
        }),
        // the limit widens by the skip count and sinks below it
        Workflow::Skip(inner) => Workflow::Skip(Skip {
            source: Box::new(coalesce(Workflow::Limit(Limit {
                source: inner.source,
                limit: limit + inner.skip,
            }))),
            skip: inner.skip,
        }),
        other => Workflow::Limit(Limit {
            source: Box::new(other),
            limit,
        }),
    }
}

fn coalesce_skip(outer: Skip) -> Workflow {
    let Skip { source, skip } = outer;
    match *source {
        Workflow::Skip(inner) => Workflow::Skip(Skip {
            source: inner.source,
            skip: inner.skip + skip,
        }),
        other => Workflow::Skip(Skip {
            source: Box::new(other),
            skip,
        }),
    }
}

fn coalesce_project(outer: Project) -> Workflow {
    let Project { source, shape, id } = outer;
    match *source {
        Workflow::Project(inner) => match inline_reshape(&shape, &inner.shape, &[]) {
            Some(inlined) => Workflow::Project(Project {
                source: inner.source,
                shape: inlined,
                id: inner.id.coalesce(id),
            }),
            None => Workflow::Project(Project {
                source: Box::new(Workflow::Project(inner)),
                shape,
                id,
            }),
        },
        Workflow::Group(inner) if id != IdHandling::ExcludeId => {
            match inline_project_group(&shape, &inner.grouped) {
                Some(grouped) => Workflow::Group(Group {
                    source: inner.source,
                    grouped,
                    by: inner.by,
                }),
                None => Workflow::Project(Project {
                    source: Box::new(Workflow::Group(inner)),
                    shape,
                    id,
                }),
            }
        }
        Workflow::Unwind(unwind) if id != IdHandling::ExcludeId => match *unwind.source {
            Workflow::Group(group) => {
                match inline_project_unwind_group(&shape, &unwind.field, &group.grouped) {
                    Some((field, grouped)) => Workflow::Unwind(Unwind {
                        source: Box::new(Workflow::Group(Group {
                            source: group.source,
                            grouped,
                            by: group.by,
                        })),
                        field,
                    }),
                    None => Workflow::Project(Project {
                        source: Box::new(Workflow::Unwind(Unwind {
                            source: Box::new(Workflow::Group(group)),
                            field: unwind.field,
                        })),
                        shape,
                        id,
                    }),
                }
            }
            other => Workflow::Project(Project {
                source: Box::new(Workflow::Unwind(Unwind {
                    source: Box::new(other),
                    field: unwind.field,
                })),
                shape,
                id,
            }),
        },
        other => Workflow::Project(Project {
            source: Box::new(other),
            shape,
            id,
        }),
    }
}

fn coalesce_group(outer: Group) -> Workflow {
    let Group {
        source,
        grouped,
        by,
    } = outer;
    // grouping by any constant makes a single group; null is the compact
    // spelling
    if let Expression::Literal(v) = &by {
        if *v != Value::Null {
            return coalesce(Workflow::Group(Group {
                source,
                grouped,
                by: Expression::Literal(Value::Null),
            }));
        }
    }
    match *source {
        Workflow::Project(inner) => match inline_group_projects(&grouped, &by, &inner.shape) {
            Some((grouped, by)) => Workflow::Group(Group {
                source: inner.source,
                grouped,
                by,
            }),
            None => Workflow::Group(Group {
                source: Box::new(Workflow::Project(inner)),
                grouped,
                by,
            }),
        },
        other => Workflow::Group(Group {
            source: Box::new(other),
            grouped,
            by,
        }),
    }
}

fn coalesce_out(outer: Out) -> Workflow {
    let Out { source, collection } = outer;
    match *source {
        // writing a collection to itself is the read
        Workflow::Read(read) if read.collection == collection => Workflow::Read(read),
        other => Workflow::Out(Out {
            source: Box::new(other),
            collection,
        }),
    }
}

fn coalesce_map(outer: Map) -> Workflow {
    let Map {
        source,
        func,
        scope,
    } = outer;
    match *source {
        Workflow::Map(inner) => match merge_scopes(&inner.scope, &scope) {
            Ok(merged) => Workflow::Map(Map {
                func: funcs::compose_map(&func, &inner.func),
                source: inner.source,
                scope: merged,
            }),
            Err(_) => Workflow::Map(Map {
                source: Box::new(Workflow::Map(inner)),
                func,
                scope,
            }),
        },
        Workflow::FlatMap(inner) => match merge_scopes(&inner.scope, &scope) {
            Ok(merged) => Workflow::FlatMap(FlatMap {
                func: funcs::map_after_flat_map(&func, &inner.func),
                source: inner.source,
                scope: merged,
            }),
            Err(_) => Workflow::Map(Map {
                source: Box::new(Workflow::FlatMap(inner)),
                func,
                scope,
            }),
        },
        other => Workflow::Map(Map {
            source: Box::new(other),
            func,
            scope,
        }),
    }
}

fn coalesce_flat_map(outer: FlatMap) -> Workflow {
    let FlatMap {
        source,
        func,
        scope,
    } = outer;
    match *source {
        Workflow::Map(inner) => match merge_scopes(&inner.scope, &scope) {
            Ok(merged) => Workflow::FlatMap(FlatMap {
                func: funcs::flat_map_after_map(&func, &inner.func),
                source: inner.source,
                scope: merged,
            }),
            Err(_) => Workflow::FlatMap(FlatMap {
                source: Box::new(Workflow::Map(inner)),
                func,
                scope,
            }),
        },
        Workflow::FlatMap(inner) => match merge_scopes(&inner.scope, &scope) {
            Ok(merged) => Workflow::FlatMap(FlatMap {
                func: funcs::flat_map_after_flat_map(&func, &inner.func),
                source: inner.source,
                scope: merged,
            }),
            Err(_) => Workflow::FlatMap(FlatMap {
                source: Box::new(Workflow::FlatMap(inner)),
                func,
                scope,
            }),
        },
        other => Workflow::FlatMap(FlatMap {
            source: Box::new(other),
            func,
            scope,
        }),
    }
}

fn coalesce_simple_map(outer: SimpleMap) -> Workflow {
    let SimpleMap {
        source,
        expr,
        flatten,
        scope,
    } = outer;
    match *source {
        Workflow::SimpleMap(inner) => match merge_scopes(&inner.scope, &scope) {
            Ok(merged) => {
                // the earlier expression threads through the later
                // flattens so both lists speak input coordinates
                let mut all_flattens = inner.flatten.clone();
                all_flattens.extend(flatten.iter().map(|f| inner.expr.and_then(f)));
                Workflow::SimpleMap(SimpleMap {
                    expr: inner.expr.and_then(&expr),
                    flatten: all_flattens,
                    source: inner.source,
                    scope: merged,
                })
            }
            Err(_) => Workflow::SimpleMap(SimpleMap {
                source: Box::new(Workflow::SimpleMap(inner)),
                expr,
                flatten,
                scope,
            }),
        },
        other => Workflow::SimpleMap(SimpleMap {
            source: Box::new(other),
            expr,
            flatten,
            scope,
        }),
    }
}

fn coalesce_fold_left(outer: FoldLeft) -> Workflow {
    let FoldLeft { head, tail } = outer;
    match *head {
        Workflow::FoldLeft(inner) => {
            let mut flat_tail = inner.tail;
            flat_tail.extend(tail);
            Workflow::FoldLeft(FoldLeft {
                head: inner.head,
                tail: flat_tail,
            })
        }
        other => Workflow::FoldLeft(FoldLeft {
            head: Box::new(other),
            tail,
        }),
    }
}

/// Resolve references through a projection shape: a bare root becomes the
/// whole shape as an expression, a field path resolves item-wise, and
/// variables pass through untouched.
fn shape_lookup(shape: &Reshape) -> impl Fn(&DocVar) -> Option<Expression> + '_ {
    move |dv: &DocVar| {
        if dv.name != DocVar::ROOT_NAME {
            return Some(Expression::Ref(dv.clone()));
        }
        match &dv.path {
            None => shape.to_expression(),
            Some(p) => shape.resolve(p.flatten()),
        }
    }
}

/// Project-after-project: rewrite the outer shape to read directly from
/// the inner projection's source. Any unresolvable reference declines.
fn inline_reshape(outer: &Reshape, inner: &Reshape, prefix: &[FieldLeaf]) -> Option<Reshape> {
    let mut items = LinkedHashMap::new();
    for (name, item) in outer.items.iter() {
        let mut here = prefix.to_vec();
        here.push(FieldLeaf::Name(name.clone()));
        let new_item = match item {
            ProjectItem::Inclusion => {
                let resolved = inner.resolve(&here)?;
                // an inclusion that resolves to itself stays an inclusion,
                // so re-projecting an already-promoted shape is a no-op
                if resolved == Expression::Ref(DocVar::field(FieldPath::new(here.clone()))) {
                    ProjectItem::Inclusion
                } else {
                    ProjectItem::Expr(resolved)
                }
            }
            ProjectItem::Expr(e) => ProjectItem::Expr(e.substitute_refs(&shape_lookup(inner))?),
            ProjectItem::Nested(r) => ProjectItem::Nested(inline_reshape(r, inner, &here)?),
        };
        items.insert(name.clone(), new_item);
    }
    Some(Reshape::new(items.into()))
}

/// The top-level source field a pure rename reads, when the item is one.
fn rename_target(name: &str, item: &ProjectItem) -> Option<String> {
    match item {
        ProjectItem::Inclusion => Some(name.to_string()),
        ProjectItem::Expr(e) => {
            let dv = e.as_var_ref()?;
            if dv.name != DocVar::ROOT_NAME {
                return None;
            }
            match dv.path.as_ref().map(|p| p.flatten()) {
                Some([FieldLeaf::Name(f)]) => Some(f.clone()),
                _ => None,
            }
        }
        ProjectItem::Nested(_) => None,
    }
}

/// The rename map of a shape: every item must be a pure rename of a
/// top-level source field.
fn collect_renames(shape: &Reshape) -> Option<Vec<(String, String)>> {
    shape
        .items
        .iter()
        .map(|(name, item)| rename_target(name, item).map(|t| (name.clone(), t)))
        .collect()
}

/// Project-after-group: push pure renames of group outputs into the group
/// itself so the projection disappears.
fn inline_project_group(shape: &Reshape, grouped: &Grouped) -> Option<Grouped> {
    let renames = collect_renames(shape)?;
    let mut items = LinkedHashMap::new();
    for (name, target) in renames {
        let acc = grouped.items.get(&target)?.clone();
        items.insert(name, acc);
    }
    Some(Grouped::new(items.into()))
}

/// Project-after-unwind-of-group: as above, additionally renaming the
/// unwound field. The unwound field must itself be renamed by the shape.
fn inline_project_unwind_group(
    shape: &Reshape,
    unwound: &DocVar,
    grouped: &Grouped,
) -> Option<(DocVar, Grouped)> {
    let renames = collect_renames(shape)?;
    if unwound.name != DocVar::ROOT_NAME {
        return None;
    }
    let unwound_target = match unwound.path.as_ref().map(|p| p.flatten()) {
        Some([FieldLeaf::Name(f)]) => f.clone(),
        _ => return None,
    };
    let new_unwound = renames
        .iter()
        .find(|(_, target)| *target == unwound_target)
        .map(|(name, _)| DocVar::field_name(name.clone()))?;
    let mut items = LinkedHashMap::new();
    for (name, target) in renames {
        let acc = grouped.items.get(&target)?.clone();
        items.insert(name, acc);
    }
    Some((new_unwound, Grouped::new(items.into())))
}

/// Group-after-project: pull the referenced projection expressions into
/// the group's own expressions. Applies only when every reference in the
/// group resolves to a pure expression of the projection.
fn inline_group_projects(
    grouped: &Grouped,
    by: &Expression,
    shape: &Reshape,
) -> Option<(Grouped, Expression)> {
    let lookup = shape_lookup(shape);
    let mut items = LinkedHashMap::new();
    for (name, acc) in grouped.items.iter() {
        items.insert(
            name.clone(),
            Accumulator {
                op: acc.op,
                expr: acc.expr.substitute_refs(&lookup)?,
            },
        );
    }
    let by = by.substitute_refs(&lookup)?;
    Some((Grouped::new(items.into()), by))
}
