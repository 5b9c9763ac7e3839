use std::fmt;

#[cfg(test)]
mod test;

/// The subset of JavaScript that map/reduce bodies are built from. This is
/// a shape, not a language: no parsing, no scoping analysis beyond what
/// substitution needs, and rendering targets the mongo shell.
#[derive(PartialEq, Debug, Clone)]
pub enum Expr {
    This,
    Null,
    Undefined,
    Bool(bool),
    Num(f64),
    Str(String),
    Ident(String),
    /// `expr.name`
    Select(Box<Expr>, String),
    /// `expr[expr]`
    Access(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    New(String, Vec<Expr>),
    UnOp(UnaryOp, Box<Expr>),
    BinOp(BinaryOp, Box<Expr>, Box<Expr>),
    /// `cond ? cons : alt`
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Fun(Func),
    Obj(Vec<(String, Expr)>),
    Arr(Vec<Expr>),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            Eq => "===",
            Neq => "!==",
            Lt => "<",
            Lte => "<=",
            Gt => ">",
            Gte => ">=",
            And => "&&",
            Or => "||",
        }
    }
}

/// An anonymous function declaration: `function (params) { body }`.
#[derive(PartialEq, Debug, Clone)]
pub struct Func {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Return(Expr),
    VarDef(String, Option<Expr>),
    Assign(Expr, Expr),
    ForIn(String, Expr, Vec<Stmt>),
    If(Expr, Vec<Stmt>, Option<Vec<Stmt>>),
}

/// A single-parameter pure-expression function. Unlike [`Func`] this is
/// data the rewriters can compose: applying one substitutes the argument
/// for the parameter in the body.
#[derive(PartialEq, Debug, Clone)]
pub struct JsFn {
    pub param: String,
    pub body: Expr,
}

impl JsFn {
    pub fn new(param: impl Into<String>, body: Expr) -> Self {
        JsFn {
            param: param.into(),
            body,
        }
    }

    pub fn identity() -> Self {
        JsFn::new("__val", Expr::Ident("__val".to_string()))
    }

    pub fn is_identity(&self) -> bool {
        self.body == Expr::Ident(self.param.clone())
    }

    /// Beta-reduce: substitute `arg` for the parameter in the body.
    pub fn apply(&self, arg: Expr) -> Expr {
        self.body.clone().subst(&self.param, &arg)
    }

    /// `self` then `outer`: `x -> outer(self(x))`.
    pub fn and_then(&self, outer: &JsFn) -> JsFn {
        JsFn::new(self.param.clone(), outer.apply(self.apply(Expr::Ident(self.param.clone()))))
    }
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    pub fn str(s: impl Into<String>) -> Expr {
        Expr::Str(s.into())
    }

    pub fn select(self, name: impl Into<String>) -> Expr {
        Expr::Select(Box::new(self), name.into())
    }

    pub fn access(self, index: Expr) -> Expr {
        Expr::Access(Box::new(self), Box::new(index))
    }

    pub fn call(self, args: Vec<Expr>) -> Expr {
        Expr::Call(Box::new(self), args)
    }

    /// Replace `this` with the named identifier. Function literals get
    /// their own `this` and are left alone.
    pub(crate) fn subst_this(self, name: &str) -> Expr {
        use Expr::*;
        match self {
            This => Ident(name.to_string()),
            Select(e, field) => Select(Box::new(e.subst_this(name)), field),
            Access(e, i) => Access(Box::new(e.subst_this(name)), Box::new(i.subst_this(name))),
            Call(f, args) => Call(
                Box::new(f.subst_this(name)),
                args.into_iter().map(|a| a.subst_this(name)).collect(),
            ),
            New(ctor, args) => New(
                ctor,
                args.into_iter().map(|a| a.subst_this(name)).collect(),
            ),
            UnOp(op, e) => UnOp(op, Box::new(e.subst_this(name))),
            BinOp(op, l, r) => BinOp(
                op,
                Box::new(l.subst_this(name)),
                Box::new(r.subst_this(name)),
            ),
            Ternary(c, t, e) => Ternary(
                Box::new(c.subst_this(name)),
                Box::new(t.subst_this(name)),
                Box::new(e.subst_this(name)),
            ),
            Obj(fields) => Obj(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, v.subst_this(name)))
                    .collect(),
            ),
            Arr(elems) => Arr(elems.into_iter().map(|e| e.subst_this(name)).collect()),
            other => other,
        }
    }

    /// Substitute `replacement` for every free occurrence of the
    /// identifier `name`. Function parameters and for-in variables shadow.
    pub fn subst(self, name: &str, replacement: &Expr) -> Expr {
        use Expr::*;
        match self {
            Ident(n) if n == name => replacement.clone(),
            Ident(n) => Ident(n),
            This | Null | Undefined | Bool(_) | Num(_) | Str(_) => self,
            Select(e, field) => Select(Box::new(e.subst(name, replacement)), field),
            Access(e, i) => Access(
                Box::new(e.subst(name, replacement)),
                Box::new(i.subst(name, replacement)),
            ),
            Call(f, args) => Call(
                Box::new(f.subst(name, replacement)),
                args.into_iter().map(|a| a.subst(name, replacement)).collect(),
            ),
            New(ctor, args) => New(
                ctor,
                args.into_iter().map(|a| a.subst(name, replacement)).collect(),
            ),
            UnOp(op, e) => UnOp(op, Box::new(e.subst(name, replacement))),
            BinOp(op, l, r) => BinOp(
                op,
                Box::new(l.subst(name, replacement)),
                Box::new(r.subst(name, replacement)),
            ),
            Ternary(c, t, e) => Ternary(
                Box::new(c.subst(name, replacement)),
                Box::new(t.subst(name, replacement)),
                Box::new(e.subst(name, replacement)),
            ),
            Fun(f) => {
                if f.params.iter().any(|p| p == name) {
                    Fun(f)
                } else {
                    Fun(Func {
                        params: f.params,
                        body: f
                            .body
                            .into_iter()
                            .map(|s| s.subst(name, replacement))
                            .collect(),
                    })
                }
            }
            Obj(fields) => Obj(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, v.subst(name, replacement)))
                    .collect(),
            ),
            Arr(elems) => Arr(
                elems
                    .into_iter()
                    .map(|e| e.subst(name, replacement))
                    .collect(),
            ),
        }
    }
}

impl Stmt {
    fn subst(self, name: &str, replacement: &Expr) -> Stmt {
        use Stmt::*;
        match self {
            Expr(e) => Expr(e.subst(name, replacement)),
            Return(e) => Return(e.subst(name, replacement)),
            // generated bodies never shadow with var defs, so the
            // initializer is the only thing to rewrite
            VarDef(n, init) => VarDef(n, init.map(|e| e.subst(name, replacement))),
            Assign(lhs, rhs) => Assign(lhs.subst(name, replacement), rhs.subst(name, replacement)),
            ForIn(var, obj, body) => {
                let obj = obj.subst(name, replacement);
                if var == name {
                    ForIn(var, obj, body)
                } else {
                    ForIn(
                        var,
                        obj,
                        body.into_iter().map(|s| s.subst(name, replacement)).collect(),
                    )
                }
            }
            If(cond, then, els) => If(
                cond.subst(name, replacement),
                then.into_iter().map(|s| s.subst(name, replacement)).collect(),
                els.map(|ss| ss.into_iter().map(|s| s.subst(name, replacement)).collect()),
            ),
        }
    }
}

fn ident_like(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().map_or(false, |c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Expr::*;
        match self {
            This => write!(f, "this"),
            Null => write!(f, "null"),
            Undefined => write!(f, "undefined"),
            Bool(b) => write!(f, "{}", b),
            Num(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.007_199_254_740_992e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Str(s) => write!(f, "\"{}\"", escape(s)),
            Ident(n) => write!(f, "{}", n),
            Select(e, name) => {
                if ident_like(name) {
                    write!(f, "{}.{}", e, name)
                } else {
                    write!(f, "{}[\"{}\"]", e, escape(name))
                }
            }
            Access(e, i) => write!(f, "{}[{}]", e, i),
            Call(callee, args) => {
                match &**callee {
                    // a function literal in callee position needs parens
                    Fun(_) => write!(f, "({})", callee)?,
                    _ => write!(f, "{}", callee)?,
                }
                write!(f, "(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            New(ctor, args) => {
                write!(f, "new {}(", ctor)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            UnOp(op, e) => match op {
                UnaryOp::Not => write!(f, "!({})", e),
                UnaryOp::Neg => write!(f, "-({})", e),
            },
            BinOp(op, l, r) => write!(f, "(({}) {} ({}))", l, op.symbol(), r),
            Ternary(c, t, e) => write!(f, "(({}) ? ({}) : ({}))", c, t, e),
            Fun(func) => write!(f, "{}", func),
            Obj(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if ident_like(k) {
                        write!(f, "{}: {}", k, v)?;
                    } else {
                        write!(f, "\"{}\": {}", escape(k), v)?;
                    }
                }
                write!(f, "}}")
            }
            Arr(elems) => {
                write!(f, "[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function ({}) {{", self.params.join(", "))?;
        for s in &self.body {
            write!(f, " {}", s)?;
        }
        write!(f, " }}")
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Stmt::*;
        match self {
            Expr(e) => write!(f, "{};", e),
            Return(e) => write!(f, "return {};", e),
            VarDef(n, Some(init)) => write!(f, "var {} = {};", n, init),
            VarDef(n, None) => write!(f, "var {};", n),
            Assign(lhs, rhs) => write!(f, "{} = {};", lhs, rhs),
            ForIn(var, obj, body) => {
                write!(f, "for (var {} in ({})) {{", var, obj)?;
                for s in body {
                    write!(f, " {}", s)?;
                }
                write!(f, " }}")
            }
            If(cond, then, els) => {
                write!(f, "if ({}) {{", cond)?;
                for s in then {
                    write!(f, " {}", s)?;
                }
                write!(f, " }}")?;
                if let Some(els) = els {
                    write!(f, " else {{")?;
                    for s in els {
                        write!(f, " {}", s)?;
                    }
                    write!(f, " }}")?;
                }
                Ok(())
            }
        }
    }
}
