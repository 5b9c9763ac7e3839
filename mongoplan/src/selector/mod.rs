use crate::{field::FieldPath, js, value::Value};

#[cfg(test)]
mod test;

/// The match language: what `$match` stages and map-reduce `query` fields
/// are written in. Field conditions keep their written order.
#[derive(PartialEq, Debug, Clone)]
pub enum Selector {
    Doc(Vec<(FieldPath, Condition)>),
    And(Vec<Selector>),
    Or(Vec<Selector>),
    Nor(Vec<Selector>),
    Where(js::Expr),
}

#[derive(PartialEq, Debug, Clone)]
pub enum Condition {
    Eq(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Type(i32),
    Regex(String),
    Mod(i64, i64),
    Size(i64),
    All(Vec<Value>),
    ElemMatch(Box<Selector>),
}

impl Selector {
    pub fn eq(field: FieldPath, value: Value) -> Selector {
        Selector::Doc(vec![(field, Condition::Eq(value))])
    }

    pub fn where_js(expr: js::Expr) -> Selector {
        Selector::Where(expr)
    }

    /// Conjunction. Two field-condition documents with disjoint fields
    /// fuse into one; anything else flattens into an n-ary `$and`.
    pub fn and(self, other: Selector) -> Selector {
        use Selector::*;
        match (self, other) {
            (Doc(mut l), Doc(r)) => {
                let disjoint = r.iter().all(|(f, _)| l.iter().all(|(g, _)| g != f));
                if disjoint {
                    l.extend(r);
                    Doc(l)
                } else {
                    And(vec![Doc(l), Doc(r)])
                }
            }
            (And(mut l), And(r)) => {
                l.extend(r);
                And(l)
            }
            (And(mut l), r) => {
                l.push(r);
                And(l)
            }
            (l, And(mut r)) => {
                r.insert(0, l);
                And(r)
            }
            (l, r) => And(vec![l, r]),
        }
    }

    /// A selector runs in a pipeline `$match` only if no `$where` occurs
    /// anywhere inside it.
    pub fn is_pipelineable(&self) -> bool {
        use Selector::*;
        match self {
            Where(_) => false,
            And(ss) | Or(ss) | Nor(ss) => ss.iter().all(Selector::is_pipelineable),
            Doc(conds) => conds.iter().all(|(_, c)| match c {
                Condition::ElemMatch(inner) => inner.is_pipelineable(),
                _ => true,
            }),
        }
    }

    /// Apply `f` to every field path. `$where` bodies see the document as
    /// `this`, so the caller separately handles them via
    /// [`Selector::rewrite_where_this`].
    pub fn rewrite_fields(self, f: &impl Fn(FieldPath) -> FieldPath) -> Selector {
        use Selector::*;
        match self {
            // fields inside $elemMatch are relative to the matched
            // element, so only the outer keys move
            Doc(conds) => Doc(conds.into_iter().map(|(path, c)| (f(path), c)).collect()),
            And(ss) => And(ss.into_iter().map(|s| s.rewrite_fields(f)).collect()),
            Or(ss) => Or(ss.into_iter().map(|s| s.rewrite_fields(f)).collect()),
            Nor(ss) => Nor(ss.into_iter().map(|s| s.rewrite_fields(f)).collect()),
            Where(expr) => Where(expr),
        }
    }

    /// Rewrite `this` in `$where` bodies to `this.<path>`; used when a
    /// match is transplanted under a base.
    pub fn rewrite_where_this(self, path: &FieldPath) -> Selector {
        use Selector::*;
        match self {
            Where(expr) => {
                // route `this` through a temporary so the replacement's own
                // `this` is not rewritten again
                let tmp = "__this";
                let moved = expr.subst_this(tmp);
                Where(moved.subst(tmp, &path.to_js(js::Expr::This)))
            }
            And(ss) => And(ss.into_iter().map(|s| s.rewrite_where_this(path)).collect()),
            Or(ss) => Or(ss.into_iter().map(|s| s.rewrite_where_this(path)).collect()),
            Nor(ss) => Nor(ss.into_iter().map(|s| s.rewrite_where_this(path)).collect()),
            doc => doc,
        }
    }

    pub fn to_bson(&self) -> bson::Document {
        use Selector::*;
        match self {
            Doc(conds) => {
                // group conditions by field first, keeping first-appearance
                // order, so repeated fields merge instead of clobbering
                let mut fields: Vec<(String, Vec<&Condition>)> = Vec::new();
                for (path, c) in conds {
                    let key = path.to_string();
                    match fields.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, cs)) => cs.push(c),
                        None => fields.push((key, vec![c])),
                    }
                }
                let mut out = bson::Document::new();
                for (key, cs) in fields {
                    match cs.as_slice() {
                        // a lone equality renders as the bare value
                        [Condition::Eq(v)] => {
                            out.insert(key, v.to_repr());
                        }
                        _ => {
                            let mut body = bson::Document::new();
                            for c in cs {
                                body.extend(c.to_bson());
                            }
                            out.insert(key, bson::Bson::Document(body));
                        }
                    }
                }
                out
            }
            And(ss) => {
                bson::doc! { "$and": ss.iter().map(Selector::to_bson).collect::<Vec<_>>() }
            }
            Or(ss) => {
                bson::doc! { "$or": ss.iter().map(Selector::to_bson).collect::<Vec<_>>() }
            }
            Nor(ss) => {
                bson::doc! { "$nor": ss.iter().map(Selector::to_bson).collect::<Vec<_>>() }
            }
            Where(expr) => bson::doc! { "$where": format!("{}", expr) },
        }
    }
}

impl Condition {
    fn to_bson(&self) -> bson::Document {
        use Condition::*;
        match self {
            Eq(v) => bson::doc! { "$eq": v.to_repr() },
            Gt(v) => bson::doc! { "$gt": v.to_repr() },
            Gte(v) => bson::doc! { "$gte": v.to_repr() },
            Lt(v) => bson::doc! { "$lt": v.to_repr() },
            Lte(v) => bson::doc! { "$lte": v.to_repr() },
            Ne(v) => bson::doc! { "$ne": v.to_repr() },
            In(vs) => bson::doc! { "$in": vs.iter().map(Value::to_repr).collect::<Vec<_>>() },
            Nin(vs) => bson::doc! { "$nin": vs.iter().map(Value::to_repr).collect::<Vec<_>>() },
            Exists(b) => bson::doc! { "$exists": *b },
            Type(code) => bson::doc! { "$type": *code },
            Regex(pattern) => bson::doc! { "$regex": pattern.as_str() },
            Mod(divisor, remainder) => bson::doc! { "$mod": [*divisor, *remainder] },
            Size(n) => bson::doc! { "$size": *n },
            All(vs) => bson::doc! { "$all": vs.iter().map(Value::to_repr).collect::<Vec<_>>() },
            ElemMatch(inner) => bson::doc! { "$elemMatch": inner.to_bson() },
        }
    }
}

