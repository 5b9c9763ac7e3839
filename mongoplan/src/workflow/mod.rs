pub mod coalesce;
pub mod crush;
pub mod definitions;
pub mod finalize;
pub(crate) mod funcs;
pub mod merge;
pub(crate) mod rewrite;


pub use self::definitions::*;

use crate::{
    expr::Expression,
    field::{DocVar, FieldPath},
    js::{Func, JsFn},
    selector::Selector,
    value::Value,
};
use self::coalesce::coalesce;

/// Smart constructors. Every node-building operation constructs the new
/// term and immediately pushes it through the coalesce rewriter, so trees
/// built through these are always locally in normal form.
impl Workflow {
    pub fn pure(value: Value) -> Workflow {
        Workflow::Pure(Pure { value })
    }

    pub fn read(collection: Collection) -> Workflow {
        Workflow::Read(Read { collection })
    }

    pub fn match_stage(self, predicate: Selector) -> Workflow {
        coalesce(Workflow::Match(Match {
            source: Box::new(self),
            predicate,
        }))
    }

    pub fn limit(self, limit: i64) -> Workflow {
        coalesce(Workflow::Limit(Limit {
            source: Box::new(self),
            limit,
        }))
    }

    pub fn skip(self, skip: i64) -> Workflow {
        coalesce(Workflow::Skip(Skip {
            source: Box::new(self),
            skip,
        }))
    }

    pub fn sort(self, specs: Vec<SortSpecification>) -> Workflow {
        coalesce(Workflow::Sort(Sort {
            source: Box::new(self),
            specs,
        }))
    }

    pub fn out(self, collection: Collection) -> Workflow {
        coalesce(Workflow::Out(Out {
            source: Box::new(self),
            collection,
        }))
    }

    pub fn project(self, shape: Reshape, id: IdHandling) -> Workflow {
        coalesce(Workflow::Project(Project {
            source: Box::new(self),
            shape,
            id,
        }))
    }

    pub fn redact(self, expr: Expression) -> Workflow {
        coalesce(Workflow::Redact(Redact {
            source: Box::new(self),
            expr,
        }))
    }

    pub fn unwind(self, field: DocVar) -> Workflow {
        coalesce(Workflow::Unwind(Unwind {
            source: Box::new(self),
            field,
        }))
    }

    pub fn group(self, grouped: Grouped, by: Expression) -> Workflow {
        coalesce(Workflow::Group(Group {
            source: Box::new(self),
            grouped,
            by,
        }))
    }

    pub fn geo_near(
        self,
        near: (f64, f64),
        distance_field: FieldPath,
        options: GeoNearOptions,
    ) -> Workflow {
        coalesce(Workflow::GeoNear(GeoNear {
            source: Box::new(self),
            near,
            distance_field,
            limit: options.limit,
            max_distance: options.max_distance,
            query: options.query,
            spherical: options.spherical,
            distance_multiplier: options.distance_multiplier,
            include_locs: options.include_locs,
            unique_docs: options.unique_docs,
        }))
    }

    pub fn map(self, func: Func, scope: Scope) -> Workflow {
        coalesce(Workflow::Map(Map {
            source: Box::new(self),
            func,
            scope,
        }))
    }

    pub fn flat_map(self, func: Func, scope: Scope) -> Workflow {
        coalesce(Workflow::FlatMap(FlatMap {
            source: Box::new(self),
            func,
            scope,
        }))
    }

    pub fn simple_map(self, expr: JsFn, flatten: Vec<JsFn>, scope: Scope) -> Workflow {
        coalesce(Workflow::SimpleMap(SimpleMap {
            source: Box::new(self),
            expr,
            flatten,
            scope,
        }))
    }

    pub fn reduce(self, func: Func, scope: Scope) -> Workflow {
        coalesce(Workflow::Reduce(Reduce {
            source: Box::new(self),
            func,
            scope,
        }))
    }

    pub fn fold_left(head: Workflow, tail: Vec<Workflow>) -> Workflow {
        assert!(!tail.is_empty(), "fold-left tail must be non-empty");
        coalesce(Workflow::FoldLeft(FoldLeft {
            head: Box::new(head),
            tail,
        }))
    }

    pub fn join(sources: Vec<Workflow>) -> Workflow {
        coalesce(Workflow::Join(Join { sources }))
    }
}
