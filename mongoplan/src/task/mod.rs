//! The executable task tree handed to the driver, plus the map-reduce
//! command specification.

use crate::{
    expr::Expression,
    field::{DocVar, FieldPath},
    js::Func,
    selector::Selector,
    value::Value,
    workflow::{Collection, Grouped, IdHandling, Reshape, Scope, SortSpecification},
};

#[derive(PartialEq, Debug, Clone)]
pub enum WorkflowTask {
    Pure(Value),
    Read(Collection),
    Pipeline {
        source: Box<WorkflowTask>,
        stages: Vec<PipelineStage>,
    },
    MapReduce {
        source: Box<WorkflowTask>,
        map_reduce: MapReduce,
    },
    FoldLeft {
        head: Box<WorkflowTask>,
        tail: Vec<WorkflowTask>,
    },
    Join {
        sources: Vec<WorkflowTask>,
    },
}

/// A pipeline stage with its source stripped: exactly what serializes to
/// a one-key aggregation document.
#[derive(PartialEq, Debug, Clone)]
pub enum PipelineStage {
    Match(Selector),
    Limit(i64),
    Skip(i64),
    Sort(Vec<SortSpecification>),
    Out(Collection),
    Project(Reshape, IdHandling),
    Redact(Expression),
    Unwind(DocVar),
    Group(Grouped, Expression),
    GeoNear(GeoNearStage),
}

#[derive(PartialEq, Debug, Clone)]
pub struct GeoNearStage {
    pub near: (f64, f64),
    pub distance_field: FieldPath,
    pub limit: Option<i64>,
    pub max_distance: Option<f64>,
    pub query: Option<Selector>,
    pub spherical: Option<bool>,
    pub distance_multiplier: Option<f64>,
    pub include_locs: Option<FieldPath>,
    pub unique_docs: Option<bool>,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        use PipelineStage::*;
        match self {
            Match(_) => "$match",
            Limit(_) => "$limit",
            Skip(_) => "$skip",
            Sort(_) => "$sort",
            Out(_) => "$out",
            Project(_, _) => "$project",
            Redact(_) => "$redact",
            Unwind(_) => "$unwind",
            Group(_, _) => "$group",
            GeoNear(_) => "$geoNear",
        }
    }
}

/// A map-reduce command. `map` and `reduce` are stored raw, with `map`
/// in `(key, value) -> [[key', value'], …]` convention; codegen wraps
/// them into the `emit`-calling form the server expects.
#[derive(PartialEq, Debug, Clone)]
pub struct MapReduce {
    pub map: Func,
    pub reduce: Func,
    pub finalizer: Option<Func>,
    pub selection: Option<Selector>,
    pub input_sort: Option<Vec<SortSpecification>>,
    pub limit: Option<i64>,
    pub scope: Scope,
    pub out: Option<Output>,
    pub js_mode: Option<bool>,
    pub verbose: Option<bool>,
}

impl MapReduce {
    pub fn basic(map: Func, reduce: Func, scope: Scope) -> MapReduce {
        MapReduce {
            map,
            reduce,
            finalizer: None,
            selection: None,
            input_sort: None,
            limit: None,
            scope,
            out: None,
            js_mode: None,
            verbose: None,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum OutputAction {
    Replace,
    Merge,
    Reduce,
}

impl OutputAction {
    pub fn command_name(&self) -> &'static str {
        match self {
            OutputAction::Replace => "replace",
            OutputAction::Merge => "merge",
            OutputAction::Reduce => "reduce",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum Output {
    /// write into the named collection, replacing it
    Named(String),
    /// the driver picks the collection; the action says how results land
    WithAction {
        action: OutputAction,
        non_atomic: Option<bool>,
    },
}
