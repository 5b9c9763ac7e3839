use crate::js;
use bson::spec::BinarySubtype;
use mongoplan_datastructures::UniqueLinkedHashMap;
use thiserror::Error;

#[cfg(test)]
mod test;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid ObjectId hex string: {0}")]
    InvalidObjectIdHex(String),
}

/// The value model carried through the compiler. Every case has a wire
/// representation ([`Value::to_repr`]) and a mongo-shell JS rendering
/// ([`Value::to_js`]). `Document` order is significant and survives all
/// transformations.
#[derive(PartialEq, Debug, Clone)]
pub enum Value {
    Double(f64),
    Text(String),
    Document(UniqueLinkedHashMap<String, Value>),
    Array(Vec<Value>),
    Binary(Vec<u8>),
    ObjectId([u8; 12]),
    Bool(bool),
    /// millisecond-precision instant
    Date(i64),
    Null,
    Regex(String),
    JavaScript(js::Expr),
    Symbol(String),
    JavaScriptScope(js::Expr, UniqueLinkedHashMap<String, Value>),
    Int32(i32),
    Timestamp(i32, i32),
    Int64(i64),
    MinKey,
    MaxKey,
    /// Placeholder for any value not representable here; renders as the
    /// JS `undefined` literal.
    NA,
}

impl Value {
    /// Wire type code, preserved verbatim for compatibility. `NA` has none.
    pub fn type_code(&self) -> Option<u8> {
        use Value::*;
        Some(match self {
            Double(_) => 1,
            Text(_) => 2,
            Document(_) => 3,
            Array(_) => 4,
            Binary(_) => 5,
            ObjectId(_) => 7,
            Bool(_) => 8,
            Date(_) => 9,
            Null => 10,
            Regex(_) => 11,
            JavaScript(_) => 13,
            Symbol(_) => 14,
            JavaScriptScope(_, _) => 15,
            Int32(_) => 16,
            Timestamp(_, _) => 17,
            Int64(_) => 18,
            MinKey => 255,
            MaxKey => 127,
            NA => return None,
        })
    }

    pub fn document(entries: impl IntoIterator<Item = (String, Value)>) -> Value {
        let mut m = linked_hash_map::LinkedHashMap::new();
        for (k, v) in entries {
            m.insert(k, v);
        }
        Value::Document(m.into())
    }

    pub fn object_id_from_hex(hex: &str) -> Result<Value> {
        bson::oid::ObjectId::parse_str(hex)
            .map(|oid| Value::ObjectId(oid.bytes()))
            .map_err(|_| Error::InvalidObjectIdHex(hex.to_string()))
    }

    /// UUIDs become 16-byte generic Binary with each 8-byte half reversed
    /// and the least-significant half first. This layout is what the wire
    /// peers expect; it must not be normalized to RFC 4122 order.
    pub fn from_uuid(uuid: uuid::Uuid) -> Value {
        let bytes = uuid.as_bytes();
        let mut out = Vec::with_capacity(16);
        out.extend(bytes[8..16].iter().rev());
        out.extend(bytes[0..8].iter().rev());
        Value::Binary(out)
    }

    /// Wire representation.
    pub fn to_repr(&self) -> bson::Bson {
        use Value::*;
        match self {
            Double(d) => bson::Bson::Double(*d),
            Text(s) => bson::Bson::String(s.clone()),
            Document(d) => bson::Bson::Document(
                d.iter().map(|(k, v)| (k.clone(), v.to_repr())).collect(),
            ),
            Array(vs) => bson::Bson::Array(vs.iter().map(Value::to_repr).collect()),
            Binary(bytes) => bson::Bson::Binary(bson::Binary {
                subtype: BinarySubtype::Generic,
                bytes: bytes.clone(),
            }),
            ObjectId(bytes) => bson::Bson::ObjectId(bson::oid::ObjectId::from_bytes(*bytes)),
            Bool(b) => bson::Bson::Boolean(*b),
            Date(millis) => bson::Bson::DateTime(bson::DateTime::from_millis(*millis)),
            Null => bson::Bson::Null,
            Regex(pattern) => bson::Bson::RegularExpression(bson::Regex {
                pattern: pattern.clone(),
                options: String::new(),
            }),
            JavaScript(expr) => bson::Bson::JavaScriptCode(format!("{}", expr)),
            Symbol(s) => bson::Bson::Symbol(s.clone()),
            JavaScriptScope(expr, scope) => {
                bson::Bson::JavaScriptCodeWithScope(bson::JavaScriptCodeWithScope {
                    code: format!("{}", expr),
                    scope: scope.iter().map(|(k, v)| (k.clone(), v.to_repr())).collect(),
                })
            }
            Int32(i) => bson::Bson::Int32(*i),
            Timestamp(t, i) => bson::Bson::Timestamp(bson::Timestamp {
                time: *t as u32,
                increment: *i as u32,
            }),
            Int64(i) => bson::Bson::Int64(*i),
            MinKey => bson::Bson::MinKey,
            MaxKey => bson::Bson::MaxKey,
            NA => bson::Bson::Undefined,
        }
    }

    /// Read a wire value back. Total: wire cases with no counterpart here
    /// become `NA`. Wire JS code is re-read as opaque raw source, so
    /// `JavaScript`/`JavaScriptScope` do not round-trip structurally.
    pub fn from_repr(repr: bson::Bson) -> Value {
        use bson::Bson;
        match repr {
            Bson::Double(d) => Value::Double(d),
            Bson::String(s) => Value::Text(s),
            Bson::Document(d) => Value::document(
                d.into_iter().map(|(k, v)| (k, Value::from_repr(v))),
            ),
            Bson::Array(vs) => Value::Array(vs.into_iter().map(Value::from_repr).collect()),
            Bson::Binary(b) => Value::Binary(b.bytes),
            Bson::ObjectId(oid) => Value::ObjectId(oid.bytes()),
            Bson::Boolean(b) => Value::Bool(b),
            Bson::DateTime(dt) => Value::Date(dt.timestamp_millis()),
            Bson::Null => Value::Null,
            Bson::RegularExpression(re) => Value::Regex(re.pattern),
            Bson::JavaScriptCode(code) => Value::JavaScript(js::Expr::Ident(code)),
            Bson::Symbol(s) => Value::Symbol(s),
            Bson::JavaScriptCodeWithScope(cws) => Value::JavaScriptScope(
                js::Expr::Ident(cws.code),
                cws.scope
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_repr(v)))
                    .collect::<linked_hash_map::LinkedHashMap<_, _>>()
                    .into(),
            ),
            Bson::Int32(i) => Value::Int32(i),
            Bson::Timestamp(ts) => Value::Timestamp(ts.time as i32, ts.increment as i32),
            Bson::Int64(i) => Value::Int64(i),
            Bson::MinKey => Value::MinKey,
            Bson::MaxKey => Value::MaxKey,
            _ => Value::NA,
        }
    }

    /// Mongo-shell JS rendering. `JavaScriptScope` drops its scope here,
    /// so that pair does not round-trip through JS.
    pub fn to_js(&self) -> js::Expr {
        use Value::*;
        match self {
            Double(d) => js::Expr::Num(*d),
            Text(s) => js::Expr::str(s.clone()),
            Document(d) => js::Expr::Obj(
                d.iter().map(|(k, v)| (k.clone(), v.to_js())).collect(),
            ),
            Array(vs) => js::Expr::Arr(vs.iter().map(Value::to_js).collect()),
            Binary(bytes) => js::Expr::ident("HexData")
                .call(vec![js::Expr::Num(0.0), js::Expr::str(hex(bytes))]),
            ObjectId(bytes) => js::Expr::ident("ObjectId").call(vec![js::Expr::str(hex(bytes))]),
            Bool(b) => js::Expr::Bool(*b),
            Date(millis) => {
                let arg = match bson::DateTime::from_millis(*millis).try_to_rfc3339_string() {
                    Ok(iso) => js::Expr::str(iso),
                    Err(_) => js::Expr::Num(*millis as f64),
                };
                js::Expr::ident("ISODate").call(vec![arg])
            }
            Null => js::Expr::Null,
            Regex(pattern) => js::Expr::New("RegExp".to_string(), vec![js::Expr::str(pattern.clone())]),
            JavaScript(expr) => expr.clone(),
            Symbol(s) => js::Expr::str(s.clone()),
            JavaScriptScope(expr, _) => expr.clone(),
            Int32(i) => js::Expr::ident("NumberInt").call(vec![js::Expr::str(i.to_string())]),
            Timestamp(t, i) => js::Expr::ident("Timestamp")
                .call(vec![js::Expr::Num(*t as f64), js::Expr::Num(*i as f64)]),
            Int64(i) => js::Expr::ident("NumberLong").call(vec![js::Expr::str(i.to_string())]),
            MinKey => js::Expr::ident("MinKey"),
            MaxKey => js::Expr::ident("MaxKey"),
            NA => js::Expr::Undefined,
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // writing to a String cannot fail
        let _ = write!(out, "{:02x}", b);
    }
    out
}
