use crate::{
    expr::{Accumulator, Expression},
    field::{DocVar, FieldLeaf, FieldPath},
    js::{Func, JsFn},
    selector::Selector,
    value::Value,
};
use linked_hash_map::LinkedHashMap;
use mongoplan_datastructures::UniqueLinkedHashMap;
use thiserror::Error;

/// The workflow IR: a recursive term over operator nodes. Construction
/// goes through the smart constructors on [`Workflow`], which push every
/// new node through the coalesce rewriter.
#[derive(PartialEq, Debug, Clone)]
pub enum Workflow {
    // sources
    Pure(Pure),
    Read(Read),
    // shape-preserving pipeline stages
    Match(Match),
    Limit(Limit),
    Skip(Skip),
    Sort(Sort),
    Out(Out),
    // reshaping pipeline stages
    Project(Project),
    Redact(Redact),
    Unwind(Unwind),
    Group(Group),
    GeoNear(GeoNear),
    // map-reduce stages
    Map(Map),
    FlatMap(FlatMap),
    SimpleMap(SimpleMap),
    Reduce(Reduce),
    // composers
    FoldLeft(FoldLeft),
    Join(Join),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Pure {
    pub value: Value,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Read {
    pub collection: Collection,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Collection {
    pub db: String,
    pub collection: String,
}

impl Collection {
    pub fn new(db: impl Into<String>, collection: impl Into<String>) -> Collection {
        Collection {
            db: db.into(),
            collection: collection.into(),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Match {
    pub source: Box<Workflow>,
    pub predicate: Selector,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Limit {
    pub source: Box<Workflow>,
    pub limit: i64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Skip {
    pub source: Box<Workflow>,
    pub skip: i64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Sort {
    pub source: Box<Workflow>,
    pub specs: Vec<SortSpecification>,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum SortSpecification {
    Asc(FieldPath),
    Desc(FieldPath),
}

impl SortSpecification {
    pub fn field(&self) -> &FieldPath {
        match self {
            SortSpecification::Asc(f) | SortSpecification::Desc(f) => f,
        }
    }

    pub fn map_field(self, f: impl FnOnce(FieldPath) -> FieldPath) -> SortSpecification {
        match self {
            SortSpecification::Asc(p) => SortSpecification::Asc(f(p)),
            SortSpecification::Desc(p) => SortSpecification::Desc(f(p)),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Out {
    pub source: Box<Workflow>,
    pub collection: Collection,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Project {
    pub source: Box<Workflow>,
    pub shape: Reshape,
    pub id: IdHandling,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Redact {
    pub source: Box<Workflow>,
    pub expr: Expression,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Unwind {
    pub source: Box<Workflow>,
    pub field: DocVar,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Group {
    pub source: Box<Workflow>,
    pub grouped: Grouped,
    pub by: Expression,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GeoNear {
    pub source: Box<Workflow>,
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

/// Optional `$geoNear` parameters, separated so the smart constructor
/// stays callable.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct GeoNearOptions {
    pub limit: Option<i64>,
    pub max_distance: Option<f64>,
    pub query: Option<Selector>,
    pub spherical: Option<bool>,
    pub distance_multiplier: Option<f64>,
    pub include_locs: Option<FieldPath>,
    pub unique_docs: Option<bool>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Map {
    pub source: Box<Workflow>,
    /// `(key, value) -> [key', value']`
    pub func: Func,
    pub scope: Scope,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FlatMap {
    pub source: Box<Workflow>,
    /// `(key, value) -> [[key', value'], …]`
    pub func: Func,
    pub scope: Scope,
}

/// A pure-JS document transform: flatten the listed array locations (in
/// input coordinates, cartesian when several), then map each resulting
/// document through `expr`.
#[derive(PartialEq, Debug, Clone)]
pub struct SimpleMap {
    pub source: Box<Workflow>,
    pub expr: JsFn,
    pub flatten: Vec<JsFn>,
    pub scope: Scope,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Reduce {
    pub source: Box<Workflow>,
    /// `(key, [value, …]) -> value'`
    pub func: Func,
    pub scope: Scope,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FoldLeft {
    pub head: Box<Workflow>,
    /// non-empty; each entry reads from and reduces into the head's output
    pub tail: Vec<Workflow>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Join {
    pub sources: Vec<Workflow>,
}

/// Free JS identifiers shipped alongside map/reduce bodies.
pub type Scope = LinkedHashMap<String, Value>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("conflicting scope definitions for `{0}`")]
pub struct ScopeConflict(pub String);

/// Left-biased union; a key bound to two unequal values is a conflict.
pub fn merge_scopes(left: &Scope, right: &Scope) -> Result<Scope, ScopeConflict> {
    let mut out = left.clone();
    for (k, v) in right {
        match out.get(k) {
            Some(existing) if existing != v => return Err(ScopeConflict(k.clone())),
            Some(_) => {}
            None => {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(out)
}

/// What a projection does about `_id`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum IdHandling {
    IncludeId,
    ExcludeId,
    IgnoreId,
}

impl IdHandling {
    /// Combining two projections that both speak for the output:
    /// `IncludeId` wins outright, an explicit exclusion beats silence.
    pub fn merge(self, other: IdHandling) -> IdHandling {
        use IdHandling::*;
        match (self, other) {
            (IncludeId, _) | (_, IncludeId) => IncludeId,
            (_, ExcludeId) => ExcludeId,
            (first, IgnoreId) => first,
        }
    }

    /// Sequencing two projections: the later one speaks unless it is
    /// silent.
    pub fn coalesce(self, other: IdHandling) -> IdHandling {
        use IdHandling::*;
        match (self, other) {
            (first, IgnoreId) => first,
            (_, second) => second,
        }
    }
}

/// An ordered mapping from output field name to what lands there.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Reshape {
    pub items: UniqueLinkedHashMap<String, ProjectItem>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ProjectItem {
    /// take the source field of the same name
    Inclusion,
    Expr(Expression),
    Nested(Reshape),
}

impl Reshape {
    pub fn new(items: UniqueLinkedHashMap<String, ProjectItem>) -> Reshape {
        Reshape { items }
    }

    /// A reshape that lists exactly `names` as inclusions.
    pub fn including(names: impl IntoIterator<Item = String>) -> Reshape {
        let mut items = LinkedHashMap::new();
        for n in names {
            items.insert(n, ProjectItem::Inclusion);
        }
        Reshape {
            items: items.into(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.items.keys()
    }

    /// Resolve a name-leaf path through this shape to the expression (in
    /// source coordinates) that lands there. `None` when the path is not
    /// produced by this shape or cannot be recovered as an expression.
    pub fn resolve(&self, path: &[FieldLeaf]) -> Option<Expression> {
        self.resolve_at(&[], path)
    }

    fn resolve_at(&self, prefix: &[FieldLeaf], path: &[FieldLeaf]) -> Option<Expression> {
        let (head, rest) = path.split_first()?;
        let name = match head {
            FieldLeaf::Name(n) => n,
            FieldLeaf::Index(_) => return None,
        };
        let item = self.items.get(name)?;
        let mut here = prefix.to_vec();
        here.push(head.clone());
        match item {
            ProjectItem::Inclusion => {
                // the source field at the same full path
                Some(Expression::Ref(DocVar::field(
                    FieldPath::new(here).extend(rest.iter().cloned()),
                )))
            }
            ProjectItem::Expr(e) => {
                if rest.is_empty() {
                    Some(e.clone())
                } else {
                    // descend into a reference; anything else is opaque
                    match e {
                        Expression::Ref(dv) => Some(Expression::Ref(
                            dv.extend_path(&FieldPath::new(rest.to_vec())),
                        )),
                        _ => None,
                    }
                }
            }
            ProjectItem::Nested(r) => {
                if rest.is_empty() {
                    r.to_expression_at(&here)
                } else {
                    r.resolve_at(&here, rest)
                }
            }
        }
    }

    /// The whole shape as one document expression, when every item can be
    /// expressed.
    pub fn to_expression(&self) -> Option<Expression> {
        self.to_expression_at(&[])
    }

    fn to_expression_at(&self, prefix: &[FieldLeaf]) -> Option<Expression> {
        let mut out = LinkedHashMap::new();
        for (name, item) in self.items.iter() {
            let mut here = prefix.to_vec();
            here.push(FieldLeaf::Name(name.clone()));
            let e = match item {
                ProjectItem::Inclusion => Expression::Ref(DocVar::field(FieldPath::new(here))),
                ProjectItem::Expr(e) => e.clone(),
                ProjectItem::Nested(r) => r.to_expression_at(&here)?,
            };
            out.insert(name.clone(), e);
        }
        Some(Expression::Document(out.into()))
    }

    /// Disjoint union; same-named nested shapes merge recursively, any
    /// other collision declines.
    pub fn merge(&self, other: &Reshape) -> Option<Reshape> {
        let mut items: LinkedHashMap<String, ProjectItem> = self
            .items
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in other.items.iter() {
            match items.get_mut(k) {
                None => {
                    items.insert(k.clone(), v.clone());
                }
                Some(ProjectItem::Nested(l)) => match v {
                    ProjectItem::Nested(r) => {
                        let merged = l.merge(r)?;
                        *l = merged;
                    }
                    _ => return None,
                },
                Some(_) => return None,
            }
        }
        Some(Reshape {
            items: items.into(),
        })
    }

    pub fn rewrite_refs(self, f: &impl Fn(&DocVar) -> DocVar) -> Reshape {
        let items = self
            .items
            .into_iter()
            .map(|(k, item)| {
                let item = match item {
                    ProjectItem::Inclusion => ProjectItem::Inclusion,
                    ProjectItem::Expr(e) => ProjectItem::Expr(e.rewrite_refs(f)),
                    ProjectItem::Nested(r) => ProjectItem::Nested(r.rewrite_refs(f)),
                };
                (k, item)
            })
            .collect::<LinkedHashMap<_, _>>();
        Reshape {
            items: items.into(),
        }
    }

    /// Every source reference the shape reads, inclusions counted at their
    /// own path.
    pub fn collect_refs(&self, out: &mut Vec<DocVar>) {
        self.collect_refs_at(&[], out)
    }

    fn collect_refs_at(&self, prefix: &[FieldLeaf], out: &mut Vec<DocVar>) {
        for (name, item) in self.items.iter() {
            let mut here = prefix.to_vec();
            here.push(FieldLeaf::Name(name.clone()));
            match item {
                ProjectItem::Inclusion => {
                    out.push(DocVar::field(FieldPath::new(here)));
                }
                ProjectItem::Expr(e) => e.collect_refs(out),
                ProjectItem::Nested(r) => r.collect_refs_at(&here, out),
            }
        }
    }

    pub fn to_js(&self, base: &crate::js::Expr) -> Option<crate::js::Expr> {
        self.to_expression()?.to_js(base)
    }

    pub fn to_bson(&self) -> bson::Document {
        self.items
            .iter()
            .map(|(k, item)| {
                let v = match item {
                    ProjectItem::Inclusion => bson::Bson::Boolean(true),
                    ProjectItem::Expr(e) => e.to_bson(),
                    ProjectItem::Nested(r) => bson::Bson::Document(r.to_bson()),
                };
                (k.clone(), v)
            })
            .collect()
    }
}

/// The accumulated side of a `$group`: output leaf name to accumulator.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Grouped {
    pub items: UniqueLinkedHashMap<String, Accumulator>,
}

impl Grouped {
    pub fn new(items: UniqueLinkedHashMap<String, Accumulator>) -> Grouped {
        Grouped { items }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.items.keys()
    }

    pub fn rewrite_refs(self, f: &impl Fn(&DocVar) -> DocVar) -> Grouped {
        let items = self
            .items
            .into_iter()
            .map(|(k, acc)| (k, acc.rewrite_refs(f)))
            .collect::<LinkedHashMap<_, _>>();
        Grouped {
            items: items.into(),
        }
    }

    pub fn to_bson(&self) -> bson::Document {
        self.items
            .iter()
            .map(|(k, acc)| (k.clone(), acc.to_bson()))
            .collect()
    }
}

impl Workflow {
    /// Operator name for diagnostics and codegen.
    pub fn name(&self) -> &'static str {
        match self {
            Workflow::Pure(_) => "$pure",
            Workflow::Read(_) => "$read",
            Workflow::Match(_) => "$match",
            Workflow::Limit(_) => "$limit",
            Workflow::Skip(_) => "$skip",
            Workflow::Sort(_) => "$sort",
            Workflow::Out(_) => "$out",
            Workflow::Project(_) => "$project",
            Workflow::Redact(_) => "$redact",
            Workflow::Unwind(_) => "$unwind",
            Workflow::Group(_) => "$group",
            Workflow::GeoNear(_) => "$geoNear",
            Workflow::Map(_) => "$map",
            Workflow::FlatMap(_) => "$flatMap",
            Workflow::SimpleMap(_) => "$simpleMap",
            Workflow::Reduce(_) => "$reduce",
            Workflow::FoldLeft(_) => "$foldLeft",
            Workflow::Join(_) => "$join",
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Workflow::Pure(_) | Workflow::Read(_))
    }

    /// Stages that cannot alter document shape.
    pub fn is_shape_preserving(&self) -> bool {
        matches!(
            self,
            Workflow::Match(_)
                | Workflow::Limit(_)
                | Workflow::Skip(_)
                | Workflow::Sort(_)
                | Workflow::Out(_)
        )
    }

    pub fn is_pipeline(&self) -> bool {
        self.is_shape_preserving()
            || matches!(
                self,
                Workflow::Project(_)
                    | Workflow::Redact(_)
                    | Workflow::Unwind(_)
                    | Workflow::Group(_)
                    | Workflow::GeoNear(_)
            )
    }

    pub fn is_map_reduce(&self) -> bool {
        matches!(
            self,
            Workflow::Map(_) | Workflow::FlatMap(_) | Workflow::SimpleMap(_) | Workflow::Reduce(_)
        )
    }

    /// Stages that rebuild the output document from scratch; a base
    /// pointing into their input does not survive them.
    pub fn resets_root(&self) -> bool {
        matches!(self, Workflow::Project(_) | Workflow::Group(_))
    }

    /// The single child, for the node kinds that have one.
    pub fn source(&self) -> Option<&Workflow> {
        match self {
            Workflow::Match(op) => Some(&op.source),
            Workflow::Limit(op) => Some(&op.source),
            Workflow::Skip(op) => Some(&op.source),
            Workflow::Sort(op) => Some(&op.source),
            Workflow::Out(op) => Some(&op.source),
            Workflow::Project(op) => Some(&op.source),
            Workflow::Redact(op) => Some(&op.source),
            Workflow::Unwind(op) => Some(&op.source),
            Workflow::Group(op) => Some(&op.source),
            Workflow::GeoNear(op) => Some(&op.source),
            Workflow::Map(op) => Some(&op.source),
            Workflow::FlatMap(op) => Some(&op.source),
            Workflow::SimpleMap(op) => Some(&op.source),
            Workflow::Reduce(op) => Some(&op.source),
            Workflow::Pure(_) | Workflow::Read(_) | Workflow::FoldLeft(_) | Workflow::Join(_) => {
                None
            }
        }
    }

    /// Rebuild the node around a transformed child. Nodes without a
    /// single child are returned unchanged.
    pub fn map_source(self, f: impl FnOnce(Workflow) -> Workflow) -> Workflow {
        match self {
            Workflow::Match(op) => {
                let source = Box::new(f(*op.source));
                Workflow::Match(Match {
                    source,
                    predicate: op.predicate,
                })
            }
            Workflow::Limit(op) => {
                let source = Box::new(f(*op.source));
                Workflow::Limit(Limit {
                    source,
                    limit: op.limit,
                })
            }
            Workflow::Skip(op) => {
                let source = Box::new(f(*op.source));
                Workflow::Skip(Skip {
                    source,
                    skip: op.skip,
                })
            }
            Workflow::Sort(op) => {
                let source = Box::new(f(*op.source));
                Workflow::Sort(Sort {
                    source,
                    specs: op.specs,
                })
            }
            Workflow::Out(op) => {
                let source = Box::new(f(*op.source));
                Workflow::Out(Out {
                    source,
                    collection: op.collection,
                })
            }
            Workflow::Project(op) => {
                let source = Box::new(f(*op.source));
                Workflow::Project(Project {
                    source,
                    shape: op.shape,
                    id: op.id,
                })
            }
            Workflow::Redact(op) => {
                let source = Box::new(f(*op.source));
                Workflow::Redact(Redact {
                    source,
                    expr: op.expr,
                })
            }
            Workflow::Unwind(op) => {
                let source = Box::new(f(*op.source));
                Workflow::Unwind(Unwind {
                    source,
                    field: op.field,
                })
            }
            Workflow::Group(op) => {
                let source = Box::new(f(*op.source));
                Workflow::Group(Group {
                    source,
                    grouped: op.grouped,
                    by: op.by,
                })
            }
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
                    source: Box::new(f(*source)),
                    near,
                    distance_field,
                    limit,
                    max_distance,
                    query,
                    spherical,
                    distance_multiplier,
                    include_locs,
                    unique_docs,
                })
            }
            Workflow::Map(op) => {
                let source = Box::new(f(*op.source));
                Workflow::Map(Map {
                    source,
                    func: op.func,
                    scope: op.scope,
                })
            }
            Workflow::FlatMap(op) => {
                let source = Box::new(f(*op.source));
                Workflow::FlatMap(FlatMap {
                    source,
                    func: op.func,
                    scope: op.scope,
                })
            }
            Workflow::SimpleMap(op) => {
                let source = Box::new(f(*op.source));
                Workflow::SimpleMap(SimpleMap {
                    source,
                    expr: op.expr,
                    flatten: op.flatten,
                    scope: op.scope,
                })
            }
            Workflow::Reduce(op) => {
                let source = Box::new(f(*op.source));
                Workflow::Reduce(Reduce {
                    source,
                    func: op.func,
                    scope: op.scope,
                })
            }
            other => other,
        }
    }

    /// Replace the single child. Nodes without one are returned unchanged.
    pub fn with_source(self, new_source: Workflow) -> Workflow {
        self.map_source(|_| new_source)
    }
}
