use crate::js;
use itertools::Itertools;
use std::{collections::BTreeSet, fmt};

#[cfg(test)]
mod test;

/// Field name the fold-left machinery stores row contents under.
pub const EXPR_LABEL: &str = "value";
/// The document key grouping writes its key to.
pub const ID_LABEL: &str = "_id";
/// Prefix of every synthesized temporary field name.
pub const TMP_PREFIX: &str = "__sd_tmp_";

/// One step of a field path.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone)]
pub enum FieldLeaf {
    Name(String),
    Index(i64),
}

impl FieldLeaf {
    pub fn name(s: impl Into<String>) -> FieldLeaf {
        FieldLeaf::Name(s.into())
    }

    /// One-way coercion: `Index(3)` compares equal to `Name("3")` only
    /// after going through here.
    pub fn to_name(&self) -> FieldLeaf {
        match self {
            FieldLeaf::Name(n) => FieldLeaf::Name(n.clone()),
            FieldLeaf::Index(i) => FieldLeaf::Name(i.to_string()),
        }
    }
}

impl fmt::Display for FieldLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldLeaf::Name(n) => write!(f, "{}", n),
            FieldLeaf::Index(i) => write!(f, "{}", i),
        }
    }
}

/// An ordered, non-empty sequence of leaves. Dot-separated in text form;
/// indices render as decimals.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone)]
pub struct FieldPath(Vec<FieldLeaf>);

impl FieldPath {
    pub fn new(leaves: Vec<FieldLeaf>) -> FieldPath {
        assert!(!leaves.is_empty(), "field path must be non-empty");
        FieldPath(leaves)
    }

    pub fn name(s: impl Into<String>) -> FieldPath {
        FieldPath(vec![FieldLeaf::Name(s.into())])
    }

    pub fn index(i: i64) -> FieldPath {
        FieldPath(vec![FieldLeaf::Index(i)])
    }

    pub fn flatten(&self) -> &[FieldLeaf] {
        &self.0
    }

    /// Path concatenation (`self` then `other`).
    pub fn concat(&self, other: &FieldPath) -> FieldPath {
        let mut leaves = self.0.clone();
        leaves.extend(other.0.iter().cloned());
        FieldPath(leaves)
    }

    /// Extension by a list of leaves; an empty list is the identity.
    pub fn extend(&self, leaves: impl IntoIterator<Item = FieldLeaf>) -> FieldPath {
        let mut out = self.0.clone();
        out.extend(leaves);
        FieldPath(out)
    }

    /// Drop the last leaf. `None` when the path is a single leaf.
    pub fn parent(&self) -> Option<FieldPath> {
        if self.0.len() <= 1 {
            None
        } else {
            Some(FieldPath(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn last(&self) -> &FieldLeaf {
        // non-empty by construction
        &self.0[self.0.len() - 1]
    }

    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// The leaves remaining after `prefix`; empty when the paths are equal,
    /// `None` when `prefix` is not a prefix.
    pub fn strip_prefix(&self, prefix: &FieldPath) -> Option<Vec<FieldLeaf>> {
        if self.starts_with(prefix) {
            Some(self.0[prefix.0.len()..].to_vec())
        } else {
            None
        }
    }

    /// Compile the path into a JS projection over `base`: names select,
    /// indices subscript.
    pub fn to_js(&self, base: js::Expr) -> js::Expr {
        self.0.iter().fold(base, |acc, leaf| match leaf {
            FieldLeaf::Name(n) => acc.select(n.clone()),
            FieldLeaf::Index(i) => acc.access(js::Expr::Num(*i as f64)),
        })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join("."))
    }
}

/// A base: where the document that downstream code treats as root actually
/// lives. `ROOT` with a path is a plain field reference (`$path`); any
/// other name is a variable reference (`$$NAME.path`).
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone)]
pub struct DocVar {
    pub name: String,
    pub path: Option<FieldPath>,
}

impl DocVar {
    pub const ROOT_NAME: &'static str = "ROOT";

    pub fn root() -> DocVar {
        DocVar {
            name: DocVar::ROOT_NAME.to_string(),
            path: None,
        }
    }

    pub fn current() -> DocVar {
        DocVar {
            name: "CURRENT".to_string(),
            path: None,
        }
    }

    // redact controls
    pub fn keep() -> DocVar {
        DocVar {
            name: "KEEP".to_string(),
            path: None,
        }
    }

    pub fn prune() -> DocVar {
        DocVar {
            name: "PRUNE".to_string(),
            path: None,
        }
    }

    pub fn descend() -> DocVar {
        DocVar {
            name: "DESCEND".to_string(),
            path: None,
        }
    }

    /// A plain field reference: ROOT narrowed to `path`.
    pub fn field(path: FieldPath) -> DocVar {
        DocVar {
            name: DocVar::ROOT_NAME.to_string(),
            path: Some(path),
        }
    }

    pub fn field_name(name: impl Into<String>) -> DocVar {
        DocVar::field(FieldPath::name(name))
    }

    pub fn is_root(&self) -> bool {
        self.name == DocVar::ROOT_NAME && self.path.is_none()
    }

    /// `self \\ path`.
    pub fn extend_path(&self, path: &FieldPath) -> DocVar {
        DocVar {
            name: self.name.clone(),
            path: Some(match &self.path {
                Some(p) => p.concat(path),
                None => path.clone(),
            }),
        }
    }

    pub fn starts_with(&self, prefix: &DocVar) -> bool {
        self.name == prefix.name
            && match (&self.path, &prefix.path) {
                (_, None) => true,
                (Some(p), Some(pre)) => p.starts_with(pre),
                (None, Some(_)) => false,
            }
    }

    /// Relocate a plain field reference under `base`. Variable references
    /// (`CURRENT`, redact controls) are left alone.
    pub fn rebase(&self, base: &DocVar) -> DocVar {
        if self.name != DocVar::ROOT_NAME {
            return self.clone();
        }
        match &self.path {
            None => base.clone(),
            Some(p) => base.extend_path(p),
        }
    }

    /// Aggregation-expression rendering: `$path` or `$$NAME.path`.
    pub fn render(&self) -> String {
        match (&*self.name, &self.path) {
            (DocVar::ROOT_NAME, Some(p)) => format!("${}", p),
            (_, Some(p)) => format!("$${}.{}", self.name, p),
            (_, None) => format!("$${}", self.name),
        }
    }

    pub fn to_js(&self, base: js::Expr) -> js::Expr {
        match &self.path {
            Some(p) => p.to_js(base),
            None => base,
        }
    }
}

impl fmt::Display for DocVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Deterministic fresh-name state, threaded explicitly through merge.
#[derive(Debug, Clone, Default)]
pub struct NameGen {
    counter: u64,
    avoid: BTreeSet<String>,
}

impl NameGen {
    pub fn new() -> NameGen {
        NameGen::default()
    }

    pub fn with_avoid(avoid: BTreeSet<String>) -> NameGen {
        NameGen { counter: 0, avoid }
    }

    pub fn names_consumed(&self) -> u64 {
        self.counter
    }

    pub fn fresh_name(&mut self) -> String {
        loop {
            let candidate = format!("{}{}", TMP_PREFIX, self.counter);
            self.counter += 1;
            if !self.avoid.contains(&candidate) {
                return candidate;
            }
        }
    }

    pub fn fresh_field(&mut self) -> FieldPath {
        FieldPath::name(self.fresh_name())
    }
}

/// The first `count` names of the `__sd_tmp_N` sequence that avoid the
/// collision set. Deterministic given the set.
pub fn gen_uniq_names(count: usize, avoid: &BTreeSet<String>) -> Vec<String> {
    let mut gen = NameGen::with_avoid(avoid.clone());
    (0..count).map(|_| gen.fresh_name()).collect()
}

/// Index analogue of [`gen_uniq_names`]: `0, 1, 2, …` minus the collision
/// set.
pub fn gen_uniq_indices(count: usize, avoid: &BTreeSet<i64>) -> Vec<i64> {
    (0..)
        .filter(|i| !avoid.contains(i))
        .take(count)
        .collect()
}
