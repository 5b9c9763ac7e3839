use crate::{
    compile_workflow, compile_workflow_with_options,
    codegen::MqlCodeGenerator,
    expr::{Accumulator, AccumulatorOp, Expression},
    field::FieldPath,
    options::{CompileOptions, ShapePromotion},
    selector::Selector,
    task::{PipelineStage, WorkflowTask},
    grouped, reshape,
    value::Value,
    workflow::{Collection, IdHandling, ProjectItem, Workflow},
};

fn read(coll: &str) -> Workflow {
    Workflow::read(Collection::new("db", coll))
}

#[test]
fn a_filtered_read_compiles_to_one_pipeline() {
    let wf = read("orders")
        .match_stage(Selector::eq(FieldPath::name("status"), Value::Int32(1)))
        .skip(10)
        .limit(5);
    let compiled = compile_workflow(wf).unwrap();
    match compiled.task {
        WorkflowTask::Pipeline { source, stages } => {
            assert_eq!(
                Box::new(WorkflowTask::Read(Collection::new("db", "orders"))),
                source
            );
            let docs = MqlCodeGenerator::new().codegen_pipeline(&stages);
            assert_eq!(
                vec![
                    bson::doc! { "$match": { "status": 1i32 } },
                    bson::doc! { "$limit": 15i64 },
                    bson::doc! { "$skip": 10i64 },
                ],
                docs
            );
        }
        other => panic!("expected a pipeline, got {:?}", other),
    }
}

#[test]
fn a_grouped_plan_promotes_its_shape() {
    let wf = read("orders").group(
        grouped! {
            "total" => Accumulator::new(AccumulatorOp::Sum, Expression::field("amount")),
        },
        Expression::literal(Value::Null),
    );
    let compiled = compile_workflow(wf.clone()).unwrap();
    match compiled.task {
        WorkflowTask::Pipeline { stages, .. } => {
            assert_eq!(2, stages.len());
            assert!(matches!(stages[0], PipelineStage::Group(_, _)));
            match &stages[1] {
                PipelineStage::Project(shape, id) => {
                    assert_eq!(IdHandling::IgnoreId, *id);
                    assert_eq!(
                        vec![&"total".to_string(), &"_id".to_string()],
                        shape.keys().collect::<Vec<_>>()
                    );
                }
                other => panic!("expected the promoted projection, got {:?}", other),
            }
        }
        other => panic!("expected a pipeline, got {:?}", other),
    }

    // the same plan without promotion carries the group alone
    let preserved = compile_workflow_with_options(
        wf,
        &CompileOptions {
            shape_promotion: ShapePromotion::Preserve,
        },
    )
    .unwrap();
    match preserved.task {
        WorkflowTask::Pipeline { stages, .. } => assert_eq!(1, stages.len()),
        other => panic!("expected a pipeline, got {:?}", other),
    }
}

#[test]
fn a_fold_left_compiles_to_the_task_with_a_final_unwrap() {
    let wf = Workflow::fold_left(read("a"), vec![read("b")]);
    let compiled = compile_workflow(wf).unwrap();
    // the fold output lives under `value`; the compiler appends one last
    // map-reduce that projects it back out
    match compiled.task {
        WorkflowTask::MapReduce { source, map_reduce } => {
            assert!(matches!(*source, WorkflowTask::FoldLeft { .. }));
            let rendered = format!("{}", map_reduce.map);
            assert!(rendered.contains("value.value"), "{}", rendered);
        }
        other => panic!("expected the unwrap shim, got {:?}", other),
    }
}

#[test]
fn projections_collapse_before_lowering() {
    let wf = read("c")
        .project(
            reshape! {
                "a" => ProjectItem::Expr(Expression::field("x")),
            },
            IdHandling::IgnoreId,
        )
        .project(
            reshape! {
                "b" => ProjectItem::Expr(Expression::field("a")),
            },
            IdHandling::IgnoreId,
        );
    let compiled = compile_workflow_with_options(
        wf,
        &CompileOptions {
            shape_promotion: ShapePromotion::Preserve,
        },
    )
    .unwrap();
    match compiled.task {
        WorkflowTask::Pipeline { stages, .. } => {
            assert_eq!(
                vec![bson::doc! { "$project": { "b": "$x" } }],
                MqlCodeGenerator::new().codegen_pipeline(&stages)
            );
        }
        other => panic!("expected a pipeline, got {:?}", other),
    }
}
