use super::{finalize, finalize_preserving};
use crate::{
    expr::{Accumulator, AccumulatorOp, Expression},
    field::{DocVar, FieldPath},
    grouped, reshape,
    value::Value,
    workflow::{
        funcs, Collection, FoldLeft, IdHandling, Project, ProjectItem, Reduce, Scope,
        Workflow,
    },
};

fn read(coll: &str) -> Workflow {
    Workflow::read(Collection::new("db", coll))
}

fn expr_wrap(wf: Workflow) -> Workflow {
    Workflow::Project(Project {
        source: Box::new(wf),
        shape: reshape! {
            "value" => ProjectItem::Expr(Expression::root()),
        },
        id: IdHandling::IncludeId,
    })
}

mod fold_left {
    use super::*;

    #[test]
    fn head_is_wrapped_and_tail_gets_the_default_reducer() {
        let finalized = finalize(Workflow::fold_left(read("a"), vec![read("b")]));
        assert_eq!(
            Workflow::FoldLeft(FoldLeft {
                head: Box::new(expr_wrap(read("a"))),
                tail: vec![Workflow::Reduce(Reduce {
                    source: Box::new(read("b")),
                    func: funcs::REDUCE_FOLD_LEFT.clone(),
                    scope: Scope::new(),
                })],
            }),
            finalized
        );
    }

    #[test]
    fn tail_already_ending_in_reduce_is_left_alone() {
        let tail_entry = read("b").reduce(funcs::REDUCE_NOP.clone(), Scope::new());
        let finalized = finalize(Workflow::fold_left(read("a"), vec![tail_entry.clone()]));
        match finalized {
            Workflow::FoldLeft(f) => assert_eq!(vec![tail_entry], f.tail),
            other => panic!("expected fold-left, got {:?}", other),
        }
    }

    #[test]
    fn finalize_is_idempotent_here() {
        let once = finalize(Workflow::fold_left(read("a"), vec![read("b")]));
        assert_eq!(once.clone(), finalize(once));
    }
}

mod map_reduce_sources {
    use super::*;

    #[test]
    fn reduce_over_expressible_project_lowers_to_a_raw_map() {
        let wf = Workflow::Reduce(Reduce {
            source: Box::new(read("c").project(
                reshape! {
                    "a" => ProjectItem::Expr(Expression::field("x")),
                },
                IdHandling::IgnoreId,
            )),
            func: funcs::REDUCE_NOP.clone(),
            scope: Scope::new(),
        });
        let finalized = finalize_preserving(wf);
        match finalized {
            Workflow::Reduce(r) => match *r.source {
                Workflow::Map(m) => {
                    assert_eq!(Box::new(read("c")), m.source);
                    assert_eq!(
                        "function (key, value) { return [key, {a: value.x}]; }",
                        format!("{}", m.func)
                    );
                }
                other => panic!("expected raw map source, got {:?}", other),
            },
            other => panic!("expected reduce, got {:?}", other),
        }
    }

    #[test]
    fn reduce_over_unwind_lowers_to_a_flat_map() {
        let wf = Workflow::Reduce(Reduce {
            source: Box::new(read("c").unwind(DocVar::field_name("xs"))),
            func: funcs::REDUCE_NOP.clone(),
            scope: Scope::new(),
        });
        let finalized = finalize_preserving(wf);
        match finalized {
            Workflow::Reduce(r) => match *r.source {
                Workflow::FlatMap(fm) => {
                    assert_eq!(Box::new(read("c")), fm.source);
                    let body = format!("{}", fm.func);
                    assert!(body.contains("for (var __idx0 in (value.xs))"), "{}", body);
                    assert!(body.contains("rez.push"), "{}", body);
                }
                other => panic!("expected raw flat map source, got {:?}", other),
            },
            other => panic!("expected reduce, got {:?}", other),
        }
    }

    #[test]
    fn inexpressible_project_is_left_for_the_pipeline() {
        // a redact-control reference has no JS form
        let wf = Workflow::Reduce(Reduce {
            source: Box::new(read("c").project(
                reshape! {
                    "a" => ProjectItem::Expr(Expression::Ref(DocVar::prune())),
                },
                IdHandling::IgnoreId,
            )),
            func: funcs::REDUCE_NOP.clone(),
            scope: Scope::new(),
        });
        let finalized = finalize_preserving(wf.clone());
        assert_eq!(wf, finalized);
    }
}

mod shape_promotion {
    use super::*;

    #[test]
    fn group_output_shape_is_pinned() {
        let wf = read("c").group(
            grouped! {
                "total" => Accumulator::new(AccumulatorOp::Sum, Expression::field("x")),
            },
            Expression::literal(Value::Null),
        );
        let finalized = finalize(wf.clone());
        match finalized {
            Workflow::Project(p) => {
                assert_eq!(IdHandling::IgnoreId, p.id);
                assert_eq!(
                    vec![&"total".to_string(), &"_id".to_string()],
                    p.shape.keys().collect::<Vec<_>>()
                );
                assert_eq!(Box::new(wf), p.source);
            }
            other => panic!("expected promoted projection, got {:?}", other),
        }
    }

    #[test]
    fn promotion_is_idempotent_over_a_projection() {
        let wf = read("c").project(
            reshape! {
                "a" => ProjectItem::Expr(Expression::field("x")),
            },
            IdHandling::IgnoreId,
        );
        let once = finalize(wf);
        assert_eq!(once.clone(), finalize(once));
    }

    #[test]
    fn unknown_shape_is_not_promoted() {
        let wf = read("c").match_stage(crate::selector::Selector::eq(
            FieldPath::name("a"),
            Value::Int32(1),
        ));
        assert_eq!(wf.clone(), finalize(wf));
    }
}

mod unused_fields {
    use super::*;

    #[test]
    fn fields_nothing_reads_are_deleted() {
        // built raw so construction-time coalescing cannot fuse the pair
        let inner = Workflow::Project(Project {
            source: Box::new(read("c")),
            shape: reshape! {
                "a" => ProjectItem::Expr(Expression::field("x")),
                "b" => ProjectItem::Expr(Expression::operator(
                    crate::expr::Operator::Add,
                    vec![Expression::field("y"), Expression::field("z")],
                )),
            },
            id: IdHandling::IgnoreId,
        });
        let outer = Workflow::Reduce(Reduce {
            source: Box::new(Workflow::Project(Project {
                source: Box::new(inner),
                shape: reshape! {
                    "out" => ProjectItem::Expr(Expression::Ref(DocVar::field(
                        FieldPath::name("a"),
                    ))),
                },
                id: IdHandling::IgnoreId,
            })),
            func: funcs::REDUCE_NOP.clone(),
            scope: Scope::new(),
        });
        let finalized = finalize_preserving(outer);
        // after pruning, the inner projection keeps only `a`, and the two
        // projections collapse into the map-reduce lowering; the surviving
        // JS must not mention the deleted field
        let rendered = format!("{:?}", finalized);
        assert!(!rendered.contains("\"b\""), "{}", rendered);
    }
}
