//! The final lowering: fold the workflow into a task tree, batching
//! contiguous pipelineable stages into pipeline tasks and lowering JS
//! stages to map-reduce specs. Each node is crushed given its child's
//! already-crushed `(base, task)` pair.


use super::definitions::*;
use super::finalize::simple_map_raw;
use super::funcs;
use crate::{
    field::{DocVar, EXPR_LABEL, FieldPath},
    js::Func,
    selector::Selector,
    task::{GeoNearStage, MapReduce, Output, OutputAction, PipelineStage, WorkflowTask},
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("fold-left tail entry lowered to {0}, expected a map-reduce task")]
    FoldLeftTailNotMapReduce(&'static str),
    #[error("join requires at least one source")]
    EmptyJoin,
}

pub fn crush(wf: Workflow) -> Result<(DocVar, WorkflowTask)> {
    match wf {
        Workflow::Pure(p) => Ok((DocVar::root(), WorkflowTask::Pure(p.value))),
        Workflow::Read(r) => Ok((DocVar::root(), WorkflowTask::Read(r.collection))),
        Workflow::Match(m) => {
            if m.predicate.is_pipelineable() {
                let (base, task) = crush(*m.source)?;
                let predicate = rebase_selector(m.predicate, &base);
                Ok((base, extend_pipeline(task, PipelineStage::Match(predicate))))
            } else {
                crush_where_match(*m.source, m.predicate)
            }
        }
        Workflow::Limit(l) => {
            let (base, task) = crush(*l.source)?;
            Ok((base, extend_pipeline(task, PipelineStage::Limit(l.limit))))
        }
        Workflow::Skip(s) => {
            let (base, task) = crush(*s.source)?;
            Ok((base, extend_pipeline(task, PipelineStage::Skip(s.skip))))
        }
        Workflow::Sort(s) => {
            let (base, task) = crush(*s.source)?;
            let specs = s
                .specs
                .into_iter()
                .map(|spec| spec.map_field(|p| rebase_field_path(p, &base)))
                .collect();
            Ok((base, extend_pipeline(task, PipelineStage::Sort(specs))))
        }
        Workflow::Out(o) => {
            let (base, task) = crush(*o.source)?;
            Ok((base, extend_pipeline(task, PipelineStage::Out(o.collection))))
        }
        Workflow::Project(p) => {
            let (base, task) = crush(*p.source)?;
            let shape = p.shape.rewrite_refs(&|dv: &DocVar| dv.rebase(&base));
            Ok((
                DocVar::root(),
                extend_pipeline(task, PipelineStage::Project(shape, p.id)),
            ))
        }
        Workflow::Redact(r) => {
            let (base, task) = crush(*r.source)?;
            let expr = r.expr.rewrite_refs(&|dv: &DocVar| dv.rebase(&base));
            Ok((base, extend_pipeline(task, PipelineStage::Redact(expr))))
        }
        Workflow::Unwind(u) => {
            let (base, task) = crush(*u.source)?;
            let field = u.field.rebase(&base);
            Ok((base, extend_pipeline(task, PipelineStage::Unwind(field))))
        }
        Workflow::Group(g) => {
            let (base, task) = crush(*g.source)?;
            let grouped = g.grouped.rewrite_refs(&|dv: &DocVar| dv.rebase(&base));
            let by = g.by.rewrite_refs(&|dv: &DocVar| dv.rebase(&base));
            Ok((
                DocVar::root(),
                extend_pipeline(task, PipelineStage::Group(grouped, by)),
            ))
        }
        Workflow::GeoNear(g) => {
            let (base, task) = crush(*g.source)?;
            let stage = GeoNearStage {
                near: g.near,
                distance_field: rebase_field_path(g.distance_field, &base),
                limit: g.limit,
                max_distance: g.max_distance,
                query: g.query.map(|q| rebase_selector(q, &base)),
                spherical: g.spherical,
                distance_multiplier: g.distance_multiplier,
                include_locs: g.include_locs.map(|p| rebase_field_path(p, &base)),
                unique_docs: g.unique_docs,
            };
            Ok((base, extend_pipeline(task, PipelineStage::GeoNear(stage))))
        }
        Workflow::Map(m) => crush_map_reduce(*m.source, MrKind::Map(m.func), m.scope),
        Workflow::FlatMap(m) => crush_map_reduce(*m.source, MrKind::FlatMap(m.func), m.scope),
        Workflow::SimpleMap(sm) => crush(simple_map_raw(sm)),
        Workflow::Reduce(r) => crush_map_reduce(*r.source, MrKind::Reduce(r.func), r.scope),
        Workflow::FoldLeft(f) => crush_fold_left(f),
        Workflow::Join(j) => {
            if j.sources.is_empty() {
                return Err(Error::EmptyJoin);
            }
            let sources = j
                .sources
                .into_iter()
                .map(|s| crush(s).map(|(_, task)| task))
                .collect::<Result<Vec<_>>>()?;
            Ok((DocVar::root(), WorkflowTask::Join { sources }))
        }
    }
}

enum MrKind {
    /// single-pair map body
    Map(Func),
    /// list-of-pairs map body
    FlatMap(Func),
    Reduce(Func),
}

fn crush_map_reduce(src: Workflow, kind: MrKind, scope: Scope) -> Result<(DocVar, WorkflowTask)> {
    let (base, src_task) = crush(src)?;

    // a compatible map-reduce child absorbs this stage instead of chaining
    let src_task = match try_compose(src_task, &kind, &scope) {
        Ok(composed) => return Ok((DocVar::root(), composed)),
        Err(task) => task,
    };

    // a short [match? sort? limit?] pipeline inlines into the command
    let (src_task, selection, input_sort, limit) = split_short_pipeline(src_task);

    let mut mr = new_mr(kind, &base, scope);
    mr.selection = selection;
    mr.input_sort = input_sort;
    mr.limit = limit;
    Ok((
        DocVar::root(),
        WorkflowTask::MapReduce {
            source: Box::new(src_task),
            map_reduce: mr,
        },
    ))
}

/// The raw command spec for one map-reduce stage over a child whose
/// content sits at `base`.
fn new_mr(kind: MrKind, base: &DocVar, scope: Scope) -> MapReduce {
    let project = base_projection(base);
    match kind {
        MrKind::Map(f) => {
            let mapped = match &project {
                Some(p) => funcs::compose_map(&f, p),
                None => f,
            };
            MapReduce::basic(funcs::lift_map(&mapped), funcs::REDUCE_NOP.clone(), scope)
        }
        MrKind::FlatMap(f) => {
            let mapped = match &project {
                Some(p) => funcs::flat_map_after_map(&f, p),
                None => f,
            };
            MapReduce::basic(mapped, funcs::REDUCE_NOP.clone(), scope)
        }
        MrKind::Reduce(f) => {
            let map = match &project {
                Some(p) => funcs::lift_map(p),
                None => funcs::lift_map(&funcs::MAP_NOP),
            };
            MapReduce::basic(map, f, scope)
        }
    }
}

fn base_projection(base: &DocVar) -> Option<Func> {
    match (&*base.name, &base.path) {
        (DocVar::ROOT_NAME, Some(path)) => Some(funcs::map_project(path)),
        _ => None,
    }
}

/// Compose this stage into a child `MapReduceTask` when the child has no
/// finalizer, no output clause, a NOP reduce, and a compatible scope.
/// Gives the task back untouched otherwise.
fn try_compose(task: WorkflowTask, kind: &MrKind, scope: &Scope) -> std::result::Result<WorkflowTask, WorkflowTask> {
    match task {
        WorkflowTask::MapReduce { source, map_reduce }
            if map_reduce.finalizer.is_none()
                && map_reduce.out.is_none()
                && map_reduce.reduce == *funcs::REDUCE_NOP =>
        {
            match merge_scopes(&map_reduce.scope, scope) {
                Ok(merged) => {
                    let mut mr = map_reduce;
                    mr.scope = merged;
                    match kind {
                        MrKind::Map(f) => mr.map = funcs::map_after_flat_map(f, &mr.map),
                        MrKind::FlatMap(f) => {
                            mr.map = funcs::flat_map_after_flat_map(f, &mr.map)
                        }
                        MrKind::Reduce(f) => mr.reduce = f.clone(),
                    }
                    Ok(WorkflowTask::MapReduce {
                        source,
                        map_reduce: mr,
                    })
                }
                Err(_) => Err(WorkflowTask::MapReduce { source, map_reduce }),
            }
        }
        other => Err(other),
    }
}

type ShortPipeline = (
    WorkflowTask,
    Option<Selector>,
    Option<Vec<SortSpecification>>,
    Option<i64>,
);

/// Recognize a child pipeline of at most `[Match, Sort, Limit]`, in that
/// order, and pull those into map-reduce command fields.
fn split_short_pipeline(task: WorkflowTask) -> ShortPipeline {
    let (source, stages) = match task {
        WorkflowTask::Pipeline { source, stages } => (source, stages),
        other => return (other, None, None, None),
    };

    let mut selection = None;
    let mut input_sort = None;
    let mut limit = None;
    let mut inlineable = true;
    for stage in &stages {
        match stage {
            PipelineStage::Match(sel)
                if selection.is_none() && input_sort.is_none() && limit.is_none() =>
            {
                selection = Some(sel.clone())
            }
            PipelineStage::Sort(specs) if input_sort.is_none() && limit.is_none() => {
                input_sort = Some(specs.clone())
            }
            PipelineStage::Limit(n) if limit.is_none() => limit = Some(*n),
            _ => {
                inlineable = false;
                break;
            }
        }
    }
    if inlineable {
        (*source, selection, input_sort, limit)
    } else {
        // not a short pipeline; leave it as the task source
        (WorkflowTask::Pipeline { source, stages }, None, None, None)
    }
}

/// A `$where`-bearing selector cannot run in a pipeline `$match`; it
/// becomes the `query` of an identity map-reduce.
fn crush_where_match(src: Workflow, predicate: Selector) -> Result<(DocVar, WorkflowTask)> {
    let (base, task) = crush(src)?;
    let selection = rebase_selector(predicate, &base);
    let map = match base_projection(&base) {
        Some(p) => funcs::lift_map(&p),
        None => funcs::lift_map(&funcs::MAP_NOP),
    };
    let mut mr = MapReduce::basic(map, funcs::REDUCE_NOP.clone(), Scope::new());
    mr.selection = Some(selection);
    Ok((
        DocVar::root(),
        WorkflowTask::MapReduce {
            source: Box::new(task),
            map_reduce: mr,
        },
    ))
}

fn crush_fold_left(f: FoldLeft) -> Result<(DocVar, WorkflowTask)> {
    let (_, head) = crush(*f.head)?;
    let tail = f
        .tail
        .into_iter()
        .map(|entry| {
            let (_, task) = crush(entry)?;
            match task {
                WorkflowTask::MapReduce {
                    source,
                    mut map_reduce,
                } => {
                    map_reduce.out = Some(Output::WithAction {
                        action: OutputAction::Reduce,
                        non_atomic: Some(true),
                    });
                    Ok(WorkflowTask::MapReduce { source, map_reduce })
                }
                other => Err(Error::FoldLeftTailNotMapReduce(task_name(&other))),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((
        DocVar::field_name(EXPR_LABEL),
        WorkflowTask::FoldLeft {
            head: Box::new(head),
            tail,
        },
    ))
}

fn task_name(task: &WorkflowTask) -> &'static str {
    match task {
        WorkflowTask::Pure(_) => "pure",
        WorkflowTask::Read(_) => "read",
        WorkflowTask::Pipeline { .. } => "pipeline",
        WorkflowTask::MapReduce { .. } => "map-reduce",
        WorkflowTask::FoldLeft { .. } => "fold-left",
        WorkflowTask::Join { .. } => "join",
    }
}

fn extend_pipeline(task: WorkflowTask, stage: PipelineStage) -> WorkflowTask {
    match task {
        WorkflowTask::Pipeline { source, mut stages } => {
            stages.push(stage);
            WorkflowTask::Pipeline { source, stages }
        }
        other => WorkflowTask::Pipeline {
            source: Box::new(other),
            stages: vec![stage],
        },
    }
}

fn rebase_selector(sel: Selector, base: &DocVar) -> Selector {
    match (&*base.name, &base.path) {
        (DocVar::ROOT_NAME, Some(path)) => sel
            .rewrite_fields(&|p| path.concat(&p))
            .rewrite_where_this(path),
        _ => sel,
    }
}

fn rebase_field_path(p: FieldPath, base: &DocVar) -> FieldPath {
    match (&*base.name, &base.path) {
        (DocVar::ROOT_NAME, Some(prefix)) => prefix.concat(&p),
        _ => p,
    }
}
