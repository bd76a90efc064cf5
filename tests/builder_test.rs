//! Tests for TreeBuilder

use rstest::rstest;

use bucketsolve::domain::{BucketSpec, TreeBuilder, ValidationError};

fn leaf(label: &str, value: f64, ratio: f64) -> BucketSpec {
    BucketSpec::new(label, value, ratio)
}

#[test]
fn given_flat_specs_in_any_order_when_building_then_links_parents_and_levels() {
    // Arrange: children declared before their parent
    let specs = vec![
        leaf("bond", 10.0, 0.4),
        leaf("stock", 20.0, 0.6),
        BucketSpec::new("total", 0.0, 1.0)
            .with_pool(50.0)
            .with_children(["stock", "bond"]),
    ];

    // Act
    let arena = TreeBuilder::new().build(&specs).unwrap();

    // Assert
    let total = arena.find("total").unwrap();
    assert_eq!(arena.roots(), &[total]);
    let order: Vec<_> = arena.iter().map(|(_, n)| n.data.label.clone()).collect();
    assert_eq!(order, vec!["total", "stock", "bond"]);
    let post: Vec<_> = arena
        .iter_postorder()
        .map(|(_, n)| n.data.label.clone())
        .collect();
    assert_eq!(post, vec!["stock", "bond", "total"]);
    assert_eq!(arena.get_by_label("bond").unwrap().level, 1);
    assert_eq!(arena.parent(arena.find("bond").unwrap()), Some(total));
}

#[test]
fn given_regex_children_when_building_then_parent_itself_is_excluded() {
    // Arrange: "fund" would match its own pattern
    let specs = vec![
        BucketSpec::new("fund", 0.0, 1.0).with_children(["regex::fund"]),
        leaf("fund_a", 1.0, 0.5),
        leaf("fund_b", 1.0, 0.5),
    ];

    // Act
    let arena = TreeBuilder::new().build(&specs).unwrap();

    // Assert
    assert_eq!(arena.leaf_labels(), vec!["fund_a", "fund_b"]);
}

#[test]
fn given_mixed_exact_and_pattern_children_when_building_then_deduplicated() {
    let specs = vec![
        BucketSpec::new("p", 0.0, 1.0).with_children(["x_1", "regex::x_"]),
        leaf("x_1", 1.0, 0.5),
        leaf("x_2", 1.0, 0.5),
    ];
    let arena = TreeBuilder::new().build(&specs).unwrap();
    let p = arena.find("p").unwrap();
    assert_eq!(arena.children(p).len(), 2);
}

#[rstest]
#[case::duplicate(
    vec![leaf("a", 1.0, 1.0), leaf("a", 2.0, 1.0)],
    ValidationError::DuplicateLabel("a".into())
)]
#[case::unknown_child(
    vec![BucketSpec::new("a", 0.0, 1.0).with_children(["ghost"])],
    ValidationError::UnknownChild { parent: "a".into(), child: "ghost".into() }
)]
#[case::self_reference(
    vec![BucketSpec::new("a", 0.0, 1.0).with_children(["a"])],
    ValidationError::SelfReference("a".into())
)]
#[case::negative_value(
    vec![leaf("a", -1.0, 1.0)],
    ValidationError::InvalidCurrentValue { label: "a".into(), value: -1.0 }
)]
#[case::negative_ratio(
    vec![leaf("a", 1.0, -0.5)],
    ValidationError::InvalidRatio { label: "a".into(), value: -0.5 }
)]
#[case::empty(vec![], ValidationError::Empty)]
fn given_invalid_specs_when_building_then_validation_error(
    #[case] specs: Vec<BucketSpec>,
    #[case] expected: ValidationError,
) {
    let err = TreeBuilder::new().build(&specs).unwrap_err();
    assert_eq!(err, expected);
}

#[test]
fn given_ratios_off_by_more_than_tolerance_when_building_then_errors() {
    // Arrange
    let specs = vec![
        BucketSpec::new("p", 0.0, 1.0).with_children(["a", "b"]),
        leaf("a", 1.0, 0.5),
        leaf("b", 1.0, 0.49),
    ];

    // Act
    let strict = TreeBuilder::new().build(&specs);
    let loose = TreeBuilder::new().with_tolerance(0.05).build(&specs);

    // Assert
    assert!(matches!(strict, Err(ValidationError::RatiosDoNotSum { .. })));
    assert!(loose.is_ok());
}

#[test]
fn given_ratios_within_tolerance_when_building_then_accepted() {
    let specs = vec![
        BucketSpec::new("p", 0.0, 1.0).with_children(["a", "b", "c"]),
        leaf("a", 1.0, 0.1),
        leaf("b", 1.0, 0.2),
        leaf("c", 1.0, 0.7),
    ];
    assert!(TreeBuilder::new().build(&specs).is_ok());
}

#[test]
fn given_seed_on_inner_node_when_building_then_errors() {
    let specs = vec![
        BucketSpec::new("root", 0.0, 1.0).with_children(["mid"]),
        BucketSpec::new("mid", 0.0, 1.0)
            .with_pool(10.0)
            .with_children(["leaf"]),
        leaf("leaf", 1.0, 1.0),
    ];
    let err = TreeBuilder::new().build(&specs).unwrap_err();
    assert!(matches!(err, ValidationError::SeedOnInnerNode { .. }));
}

#[test]
fn given_invalid_regex_when_building_then_errors() {
    let specs = vec![BucketSpec::new("p", 0.0, 1.0).with_children(["regex::(["])];
    let err = TreeBuilder::new().build(&specs).unwrap_err();
    assert!(matches!(err, ValidationError::InvalidPattern { .. }));
}

#[test]
fn given_inner_value_mismatch_when_building_then_errors() {
    // Arrange
    let specs = vec![
        BucketSpec::new("root", 0.0, 1.0).with_children(["acct"]),
        BucketSpec::new("acct", 9000.0, 1.0).with_children(["f"]),
        leaf("f", 10.0, 1.0),
    ];

    // Act
    let err = TreeBuilder::new().build(&specs).unwrap_err();

    // Assert
    assert_eq!(
        err,
        ValidationError::InnerValueMismatch {
            label: "acct".to_string(),
            declared: 9000.0,
            children: 10.0,
        }
    );
}

#[test]
fn given_inner_value_matching_children_when_building_then_kept() {
    let specs = vec![
        BucketSpec::new("p", 40.0, 1.0).with_children(["a", "b"]),
        leaf("a", 10.0, 0.5),
        leaf("b", 30.0, 0.5),
    ];
    let arena = TreeBuilder::new().build(&specs).unwrap();
    assert_eq!(arena.get_by_label("p").unwrap().data.current_value, 40.0);
}
