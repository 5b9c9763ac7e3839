//! A workflow algebra and compiler for a document database: a logical
//! plan arrives as a term built from aggregation-pipeline and map/reduce
//! operators, is simplified algebraically at construction, merged with
//! sibling plans when two branches feed one consumer, and finally crushed
//! into the sequential task tree a driver executes.

pub mod codegen;
pub mod expr;
pub mod field;
pub mod js;
pub mod options;
pub mod result;
pub mod selector;
pub mod task;
pub mod util;
pub mod value;
pub mod workflow;

#[cfg(test)]
mod test;

use crate::{
    field::DocVar,
    options::{CompileOptions, ShapePromotion},
    result::Result,
    task::{MapReduce, WorkflowTask},
    workflow::{
        crush::crush,
        finalize::{finalize, finalize_preserving},
        funcs, Scope, Workflow,
    },
};

/// The driver-ready output of a compilation.
#[derive(PartialEq, Debug, Clone)]
pub struct Compilation {
    pub task: WorkflowTask,
}

pub fn compile_workflow(wf: Workflow) -> Result<Compilation> {
    compile_workflow_with_options(wf, &CompileOptions::default())
}

pub fn compile_workflow_with_options(
    wf: Workflow,
    options: &CompileOptions,
) -> Result<Compilation> {
    let finalized = match options.shape_promotion {
        ShapePromotion::Promote => finalize(wf),
        ShapePromotion::Preserve => finalize_preserving(wf),
    };
    let (base, task) = crush(finalized)?;
    // a non-root base (a fold-left output) needs one last projection so
    // the driver reads plain documents
    let task = match (&*base.name, &base.path) {
        (DocVar::ROOT_NAME, Some(path)) => WorkflowTask::MapReduce {
            source: Box::new(task),
            map_reduce: MapReduce::basic(
                funcs::lift_map(&funcs::map_project(path)),
                funcs::REDUCE_NOP.clone(),
                Scope::new(),
            ),
        },
        _ => task,
    };
    Ok(Compilation { task })
}
