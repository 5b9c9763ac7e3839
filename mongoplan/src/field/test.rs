use super::*;

macro_rules! test_render {
    ($func_name:ident, expected = $expected:expr, input = $input:expr,) => {
        #[test]
        fn $func_name() {
            assert_eq!($expected, format!("{}", $input));
        }
    };
}

test_render!(single_name, expected = "a", input = FieldPath::name("a"),);
test_render!(
    dotted_with_index,
    expected = "a.b.3",
    input = FieldPath::name("a").extend(vec![FieldLeaf::name("b"), FieldLeaf::Index(3)]),
);
test_render!(
    field_reference,
    expected = "$a.b",
    input = DocVar::field(FieldPath::name("a").extend(vec![FieldLeaf::name("b")])),
);
test_render!(root_reference, expected = "$$ROOT", input = DocVar::root(),);
test_render!(
    variable_reference,
    expected = "$$CURRENT",
    input = DocVar::current(),
);

#[test]
fn concat_flattens_associatively() {
    let a = FieldPath::name("a");
    let b = FieldPath::name("b").extend(vec![FieldLeaf::Index(0)]);
    let c = FieldPath::name("c");

    let mut expected = a.flatten().to_vec();
    expected.extend(b.flatten().iter().cloned());
    expected.extend(c.flatten().iter().cloned());

    assert_eq!(expected, a.concat(&b).concat(&c).flatten());
    assert_eq!(a.concat(&b).concat(&c), a.concat(&b.concat(&c)));
}

#[test]
fn parent_drops_last_leaf() {
    let p = FieldPath::name("a").extend(vec![FieldLeaf::name("b")]);
    assert_eq!(Some(FieldPath::name("a")), p.parent());
    assert_eq!(None, FieldPath::name("a").parent());
}

#[test]
fn starts_with_and_strip_prefix() {
    let p = FieldPath::name("a").extend(vec![FieldLeaf::name("b"), FieldLeaf::name("c")]);
    let pre = FieldPath::name("a").extend(vec![FieldLeaf::name("b")]);
    assert!(p.starts_with(&pre));
    assert!(!pre.starts_with(&p));
    assert_eq!(Some(vec![FieldLeaf::name("c")]), p.strip_prefix(&pre));
    assert_eq!(Some(vec![]), p.strip_prefix(&p));
    assert_eq!(None, pre.strip_prefix(&FieldPath::name("z")));
}

#[test]
fn name_and_index_compare_distinct_until_coerced() {
    assert_ne!(FieldLeaf::name("3"), FieldLeaf::Index(3));
    assert_eq!(FieldLeaf::name("3"), FieldLeaf::Index(3).to_name());
}

#[test]
fn path_projects_into_js() {
    let p = FieldPath::name("a").extend(vec![FieldLeaf::name("b"), FieldLeaf::Index(3)]);
    assert_eq!("this.a.b[3]", format!("{}", p.to_js(crate::js::Expr::This)));
}

#[test]
fn rebase_prefixes_field_references() {
    let base = DocVar::field_name("out");
    assert_eq!(
        DocVar::field(FieldPath::name("out").extend(vec![FieldLeaf::name("a")])),
        DocVar::field_name("a").rebase(&base)
    );
    // a bare ROOT lands on the base itself
    assert_eq!(base, DocVar::root().rebase(&base));
    // variables are not field references
    assert_eq!(DocVar::current(), DocVar::current().rebase(&base));
}

mod name_gen {
    use super::*;

    #[test]
    fn sequence_is_deterministic() {
        let mut gen = NameGen::new();
        assert_eq!("__sd_tmp_0", gen.fresh_name());
        assert_eq!("__sd_tmp_1", gen.fresh_name());
        assert_eq!(2, gen.names_consumed());
    }

    #[test]
    fn collisions_are_skipped() {
        let avoid = BTreeSet::from(["__sd_tmp_0".to_string(), "__sd_tmp_2".to_string()]);
        assert_eq!(
            vec!["__sd_tmp_1".to_string(), "__sd_tmp_3".to_string()],
            gen_uniq_names(2, &avoid)
        );
    }

    #[test]
    fn uniq_names_are_distinct_and_avoid_the_set() {
        let avoid = BTreeSet::from(["__sd_tmp_1".to_string()]);
        let names = gen_uniq_names(4, &avoid);
        let distinct: std::collections::BTreeSet<_> = names.iter().cloned().collect();
        assert_eq!(4, distinct.len());
        assert!(names.iter().all(|n| !avoid.contains(n)));
    }

    #[test]
    fn uniq_indices_skip_collisions() {
        let avoid = BTreeSet::from([0i64, 1i64]);
        assert_eq!(vec![2, 3, 4], gen_uniq_indices(3, &avoid));
    }
}
