use crate::{
    field::DocVar,
    js::{self, BinaryOp, UnaryOp},
    value::Value,
};
use mongoplan_datastructures::UniqueLinkedHashMap;

#[cfg(test)]
mod test;

/// The aggregation expression language: what projection shapes, group
/// keys, accumulator arguments, and redact bodies are written in.
#[derive(PartialEq, Debug, Clone)]
pub enum Expression {
    Literal(Value),
    Ref(DocVar),
    Document(UniqueLinkedHashMap<String, Expression>),
    Array(Vec<Expression>),
    Operator(OperatorApplication),
}

#[derive(PartialEq, Debug, Clone)]
pub struct OperatorApplication {
    pub op: Operator,
    pub args: Vec<Expression>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Operator {
    // arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    // string
    Concat,
    ToLower,
    ToUpper,
    Substr,
    // comparison
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Cmp,
    // boolean
    And,
    Or,
    Not,
    // conditional
    Cond,
    IfNull,
    // array
    Size,
}

impl Operator {
    pub fn mql_name(&self) -> &'static str {
        use Operator::*;
        match self {
            Add => "$add",
            Subtract => "$subtract",
            Multiply => "$multiply",
            Divide => "$divide",
            Mod => "$mod",
            Concat => "$concat",
            ToLower => "$toLower",
            ToUpper => "$toUpper",
            Substr => "$substr",
            Eq => "$eq",
            Ne => "$ne",
            Lt => "$lt",
            Lte => "$lte",
            Gt => "$gt",
            Gte => "$gte",
            Cmp => "$cmp",
            And => "$and",
            Or => "$or",
            Not => "$not",
            Cond => "$cond",
            IfNull => "$ifNull",
            Size => "$size",
        }
    }
}

impl Expression {
    pub fn literal(value: Value) -> Expression {
        Expression::Literal(value)
    }

    pub fn field(name: impl Into<String>) -> Expression {
        Expression::Ref(DocVar::field_name(name))
    }

    pub fn root() -> Expression {
        Expression::Ref(DocVar::root())
    }

    pub fn operator(op: Operator, args: Vec<Expression>) -> Expression {
        Expression::Operator(OperatorApplication { op, args })
    }

    /// The reference this expression is, if it is nothing but one. Pure
    /// renames in projection shapes are exactly these.
    pub fn as_var_ref(&self) -> Option<&DocVar> {
        match self {
            Expression::Ref(dv) => Some(dv),
            _ => None,
        }
    }

    /// Serialize for an expression position in a pipeline stage. Literals
    /// that the server would misread as operators or references wrap in
    /// `$literal`; unambiguous scalars emit bare.
    pub fn to_bson(&self) -> bson::Bson {
        use Expression::*;
        match self {
            Literal(v) => match v {
                Value::Null | Value::Bool(_) | Value::Double(_) | Value::Int32(_)
                | Value::Int64(_) | Value::Date(_) | Value::ObjectId(_)
                | Value::Timestamp(_, _) | Value::MinKey | Value::MaxKey => v.to_repr(),
                _ => bson::bson!({ "$literal": v.to_repr() }),
            },
            Ref(dv) => bson::Bson::String(dv.render()),
            Document(d) => bson::Bson::Document(
                d.iter().map(|(k, v)| (k.clone(), v.to_bson())).collect(),
            ),
            Array(es) => bson::Bson::Array(es.iter().map(Expression::to_bson).collect()),
            Operator(app) => bson::bson!({
                app.op.mql_name(): bson::Bson::Array(
                    app.args.iter().map(Expression::to_bson).collect(),
                )
            }),
        }
    }

    /// Compile to JS over `base` (the document the references are relative
    /// to). Partial: operators with no JS equivalent, variable references
    /// other than ROOT/CURRENT, and arities the JS form cannot express
    /// return `None`.
    pub fn to_js(&self, base: &js::Expr) -> Option<js::Expr> {
        use Expression::*;
        match self {
            Literal(v) => Some(v.to_js()),
            Ref(dv) => match &*dv.name {
                DocVar::ROOT_NAME | "CURRENT" => Some(dv.to_js(base.clone())),
                _ => None,
            },
            Document(d) => {
                let mut fields = Vec::with_capacity(d.len());
                for (k, v) in d.iter() {
                    fields.push((k.clone(), v.to_js(base)?));
                }
                Some(js::Expr::Obj(fields))
            }
            Array(es) => {
                let elems = es
                    .iter()
                    .map(|e| e.to_js(base))
                    .collect::<Option<Vec<_>>>()?;
                Some(js::Expr::Arr(elems))
            }
            Operator(app) => app.to_js(base),
        }
    }

    /// Apply `f` to every reference in the expression.
    pub fn rewrite_refs(self, f: &impl Fn(&DocVar) -> DocVar) -> Expression {
        use Expression::*;
        match self {
            Literal(v) => Literal(v),
            Ref(dv) => Ref(f(&dv)),
            Document(d) => Document(
                d.into_iter()
                    .map(|(k, v)| (k, v.rewrite_refs(f)))
                    .collect::<linked_hash_map::LinkedHashMap<_, _>>()
                    .into(),
            ),
            Array(es) => Array(es.into_iter().map(|e| e.rewrite_refs(f)).collect()),
            Operator(app) => Operator(OperatorApplication {
                op: app.op,
                args: app.args.into_iter().map(|e| e.rewrite_refs(f)).collect(),
            }),
        }
    }

    /// Substitute references through a lookup; `None` from the lookup for
    /// any reference declines the whole rewrite.
    pub fn substitute_refs(
        &self,
        lookup: &impl Fn(&DocVar) -> Option<Expression>,
    ) -> Option<Expression> {
        use Expression::*;
        match self {
            Literal(v) => Some(Literal(v.clone())),
            Ref(dv) => lookup(dv),
            Document(d) => {
                let mut out = linked_hash_map::LinkedHashMap::new();
                for (k, v) in d.iter() {
                    out.insert(k.clone(), v.substitute_refs(lookup)?);
                }
                Some(Document(out.into()))
            }
            Array(es) => Some(Array(
                es.iter()
                    .map(|e| e.substitute_refs(lookup))
                    .collect::<Option<Vec<_>>>()?,
            )),
            Operator(app) => Some(Operator(OperatorApplication {
                op: app.op,
                args: app
                    .args
                    .iter()
                    .map(|e| e.substitute_refs(lookup))
                    .collect::<Option<Vec<_>>>()?,
            })),
        }
    }

    pub fn collect_refs(&self, out: &mut Vec<DocVar>) {
        use Expression::*;
        match self {
            Literal(_) => {}
            Ref(dv) => out.push(dv.clone()),
            Document(d) => d.values().for_each(|v| v.collect_refs(out)),
            Array(es) => es.iter().for_each(|e| e.collect_refs(out)),
            Operator(app) => app.args.iter().for_each(|e| e.collect_refs(out)),
        }
    }
}

impl OperatorApplication {
    fn to_js(&self, base: &js::Expr) -> Option<js::Expr> {
        use Operator::*;

        let args = self
            .args
            .iter()
            .map(|e| e.to_js(base))
            .collect::<Option<Vec<_>>>()?;

        let bin = |op: BinaryOp, args: Vec<js::Expr>| -> Option<js::Expr> {
            if args.len() == 2 {
                let mut it = args.into_iter();
                let l = it.next()?;
                let r = it.next()?;
                Some(js::Expr::BinOp(op, Box::new(l), Box::new(r)))
            } else {
                None
            }
        };
        let fold = |op: BinaryOp, args: Vec<js::Expr>| -> Option<js::Expr> {
            let mut it = args.into_iter();
            let first = it.next()?;
            Some(it.fold(first, |acc, e| {
                js::Expr::BinOp(op, Box::new(acc), Box::new(e))
            }))
        };

        match self.op {
            Add => fold(BinaryOp::Add, args),
            Subtract => bin(BinaryOp::Sub, args),
            Multiply => fold(BinaryOp::Mul, args),
            Divide => bin(BinaryOp::Div, args),
            Mod => bin(BinaryOp::Mod, args),
            Concat => fold(BinaryOp::Add, args),
            ToLower => match &args[..] {
                [s] => Some(s.clone().select("toLowerCase").call(vec![])),
                _ => None,
            },
            ToUpper => match &args[..] {
                [s] => Some(s.clone().select("toUpperCase").call(vec![])),
                _ => None,
            },
            Eq => bin(BinaryOp::Eq, args),
            Ne => bin(BinaryOp::Neq, args),
            Lt => bin(BinaryOp::Lt, args),
            Lte => bin(BinaryOp::Lte, args),
            Gt => bin(BinaryOp::Gt, args),
            Gte => bin(BinaryOp::Gte, args),
            And => fold(BinaryOp::And, args),
            Or => fold(BinaryOp::Or, args),
            Not => match &args[..] {
                [e] => Some(js::Expr::UnOp(UnaryOp::Not, Box::new(e.clone()))),
                _ => None,
            },
            Cond => match &args[..] {
                [c, t, e] => Some(js::Expr::Ternary(
                    Box::new(c.clone()),
                    Box::new(t.clone()),
                    Box::new(e.clone()),
                )),
                _ => None,
            },
            IfNull => match &args[..] {
                [a, b] => Some(js::Expr::Ternary(
                    Box::new(js::Expr::BinOp(
                        BinaryOp::Neq,
                        Box::new(a.clone()),
                        Box::new(js::Expr::Null),
                    )),
                    Box::new(a.clone()),
                    Box::new(b.clone()),
                )),
                _ => None,
            },
            Size => match &args[..] {
                [e] => Some(e.clone().select("length")),
                _ => None,
            },
            Substr | Cmp => None,
        }
    }
}

/// A group accumulator: the operator plus its argument expression.
#[derive(PartialEq, Debug, Clone)]
pub struct Accumulator {
    pub op: AccumulatorOp,
    pub expr: Expression,
}

impl Accumulator {
    pub fn new(op: AccumulatorOp, expr: Expression) -> Accumulator {
        Accumulator { op, expr }
    }

    pub fn to_bson(&self) -> bson::Bson {
        bson::bson!({ self.op.mql_name(): self.expr.to_bson() })
    }

    pub fn rewrite_refs(self, f: &impl Fn(&DocVar) -> DocVar) -> Accumulator {
        Accumulator {
            op: self.op,
            expr: self.expr.rewrite_refs(f),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum AccumulatorOp {
    AddToSet,
    Push,
    First,
    Last,
    Max,
    Min,
    Avg,
    Sum,
}

impl AccumulatorOp {
    pub fn mql_name(&self) -> &'static str {
        use AccumulatorOp::*;
        match self {
            AddToSet => "$addToSet",
            Push => "$push",
            First => "$first",
            Last => "$last",
            Max => "$max",
            Min => "$min",
            Avg => "$avg",
            Sum => "$sum",
        }
    }
}
