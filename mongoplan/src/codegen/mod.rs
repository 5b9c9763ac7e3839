//! Serialization of the lowered artifacts into the wire documents the
//! driver ships: one-key pipeline stage documents and map-reduce command
//! fields.

mod stages;


use crate::{
    js::{Expr, Func, Stmt},
    task::{MapReduce, Output, PipelineStage},
};

#[derive(Clone, Debug, Default)]
pub struct MqlCodeGenerator {}

impl MqlCodeGenerator {
    pub fn new() -> MqlCodeGenerator {
        MqlCodeGenerator {}
    }

    pub fn codegen_pipeline(&self, stages: &[PipelineStage]) -> Vec<bson::Document> {
        stages.iter().map(|s| self.codegen_stage(s)).collect()
    }

    /// The map-reduce command fields. `target` names the output collection
    /// for action-valued outputs, which carry no name of their own.
    pub fn codegen_map_reduce(&self, mr: &MapReduce, target: Option<&str>) -> bson::Document {
        let mut out = bson::doc! {
            "map": bson::Bson::JavaScriptCode(format!("{}", emit_wrapper(&mr.map))),
            "reduce": bson::Bson::JavaScriptCode(format!("{}", mr.reduce)),
        };
        if let Some(sel) = &mr.selection {
            out.insert("query", sel.to_bson());
        }
        if let Some(specs) = &mr.input_sort {
            out.insert("sort", stages::sort_doc(specs));
        }
        if let Some(limit) = mr.limit {
            out.insert("limit", limit);
        }
        if let Some(f) = &mr.finalizer {
            out.insert("finalize", bson::Bson::JavaScriptCode(format!("{}", f)));
        }
        if !mr.scope.is_empty() {
            out.insert(
                "scope",
                mr.scope
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_repr()))
                    .collect::<bson::Document>(),
            );
        }
        if let Some(js_mode) = mr.js_mode {
            out.insert("jsMode", js_mode);
        }
        if let Some(verbose) = mr.verbose {
            out.insert("verbose", verbose);
        }
        out.insert("out", self.codegen_output(mr.out.as_ref(), target));
        out
    }

    fn codegen_output(&self, out: Option<&Output>, target: Option<&str>) -> bson::Bson {
        match out {
            None => match target {
                Some(t) => bson::Bson::String(t.to_string()),
                None => bson::bson!({ "inline": 1 }),
            },
            Some(Output::Named(coll)) => bson::Bson::String(coll.clone()),
            Some(Output::WithAction { action, non_atomic }) => {
                let mut doc = bson::doc! {
                    action.command_name(): target.unwrap_or_default(),
                };
                if let Some(na) = non_atomic {
                    doc.insert("nonAtomic", *na);
                }
                bson::Bson::Document(doc)
            }
        }
    }
}

/// The server calls `map` with `this` bound to each input document; our
/// raw list-of-pairs body becomes a zero-argument function that emits
/// every pair.
fn emit_wrapper(raw: &Func) -> Func {
    Func {
        params: vec![],
        body: vec![Stmt::Expr(
            Expr::Fun(raw.clone())
                .call(vec![
                    Expr::This.select("_id"),
                    Expr::This,
                ])
                .select("map")
                .call(vec![Expr::Fun(Func {
                    params: vec!["__pair".to_string()],
                    body: vec![Stmt::Expr(
                        Expr::ident("emit")
                            .select("apply")
                            .call(vec![Expr::Null, Expr::ident("__pair")]),
                    )],
                })]),
        )],
    }
}
