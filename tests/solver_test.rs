//! Tests for the three allocation strategies on whole trees

use rstest::rstest;

use bucketsolve::domain::solver::{MonteCarloSolver, UnconstrainedSolver};
use bucketsolve::domain::{
    solve, solve_with, BucketArena, BucketSpec, DomainError, InfeasibleError, SolveParams,
    Strategy, TreeBuilder,
};
use bucketsolve::util::testing;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[ctor::ctor]
fn init() {
    testing::init_test_setup();
}

const EPS: f64 = 1e-6;
const RATIOS: [f64; 6] = [0.22, 0.28, 0.10, 0.15, 0.10, 0.15];
const LEAVES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

/// One root holding six leaves.
fn six_leaves(pool: f64, values: [f64; 6]) -> BucketArena {
    let mut specs = vec![BucketSpec::new("root", 0.0, 1.0)
        .with_pool(pool)
        .with_children(LEAVES)];
    for ((label, ratio), value) in LEAVES.iter().zip(RATIOS).zip(values) {
        specs.push(BucketSpec::new(*label, value, ratio));
    }
    TreeBuilder::new().build(&specs).unwrap()
}

/// Three levels, integer amounts.
fn nested(pool: f64) -> BucketArena {
    let specs = vec![
        BucketSpec::new("portfolio", 0.0, 1.0)
            .with_pool(pool)
            .with_children(["equity", "fixed", "cash"]),
        BucketSpec::new("equity", 0.0, 0.6).with_children(["regex::eq_"]),
        BucketSpec::new("fixed", 0.0, 0.3).with_children(["gov", "corp"]),
        BucketSpec::new("cash", 900.0, 0.1),
        BucketSpec::new("eq_us", 3000.0, 0.5),
        BucketSpec::new("eq_eu", 1000.0, 0.3),
        BucketSpec::new("eq_em", 200.0, 0.2),
        BucketSpec::new("gov", 1500.0, 0.5),
        BucketSpec::new("corp", 400.0, 0.5),
    ];
    TreeBuilder::new().build(&specs).unwrap()
}

fn contributions(arena: &BucketArena, labels: &[&str]) -> Vec<f64> {
    labels
        .iter()
        .map(|l| arena.get_by_label(l).unwrap().data.amount_to_add)
        .collect()
}

fn assert_all_close(actual: &[f64], expected: &[f64], tolerance: f64) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() <= tolerance, "{:?} != {:?}", actual, expected);
    }
}

fn params_with_seed(step_size: f64, seed: u64) -> SolveParams {
    SolveParams {
        step_size,
        seed: Some(seed),
        ..Default::default()
    }
}

#[test]
fn given_scenario_a_when_solving_unconstrained_then_matches_worked_example() {
    // Arrange
    let mut arena = six_leaves(8000.0, [1000.0; 6]);

    // Act
    let report = solve(&mut arena, Strategy::Unconstrained, &SolveParams::default()).unwrap();

    // Assert
    assert_all_close(
        &contributions(&arena, &LEAVES),
        &[2080.0, 2920.0, 400.0, 1100.0, 400.0, 1100.0],
        EPS,
    );
    let results: Vec<f64> = LEAVES
        .iter()
        .map(|l| arena.get_by_label(l).unwrap().data.results_value.unwrap())
        .collect();
    assert_all_close(&results, &[3080.0, 3920.0, 1400.0, 2100.0, 1400.0, 2100.0], EPS);
    for (label, ratio) in LEAVES.iter().zip(RATIOS) {
        let node = arena.get_by_label(label).unwrap();
        assert!((node.data.results_ratio.unwrap() - ratio).abs() < EPS);
    }
    assert!((report.allocated - 8000.0).abs() < EPS);
    assert_eq!(report.unallocated, 0.0);
}

#[test]
fn given_scenario_a_when_solving_constrained_then_same_as_unconstrained() {
    // Arrange
    let mut arena = six_leaves(8000.0, [1000.0; 6]);

    // Act
    solve(&mut arena, Strategy::Constrained, &SolveParams::default()).unwrap();

    // Assert
    assert_all_close(
        &contributions(&arena, &LEAVES),
        &[2080.0, 2920.0, 400.0, 1100.0, 400.0, 1100.0],
        EPS,
    );
}

#[test]
fn given_scenario_b_when_solving_unconstrained_then_overweight_leaf_withdraws() {
    // Arrange: c targets 10% but holds 5000 of 10000
    let mut arena = six_leaves(0.0, [1000.0, 1000.0, 5000.0, 1000.0, 1000.0, 1000.0]);

    // Act
    solve(&mut arena, Strategy::Unconstrained, &SolveParams::default()).unwrap();

    // Assert
    let x = contributions(&arena, &LEAVES);
    assert_all_close(&x, &[1200.0, 1800.0, -4000.0, 500.0, 0.0, 500.0], EPS);
    assert!(x.iter().sum::<f64>().abs() < EPS);
}

#[test]
fn given_scenario_b_with_zero_pool_when_solving_constrained_then_nothing_moves() {
    // Arrange
    let mut arena = six_leaves(0.0, [1000.0, 1000.0, 5000.0, 1000.0, 1000.0, 1000.0]);

    // Act
    solve(&mut arena, Strategy::Constrained, &SolveParams::default()).unwrap();

    // Assert
    assert_all_close(&contributions(&arena, &LEAVES), &[0.0; 6], EPS);
}

#[test]
fn given_scenario_b_with_pool_when_solving_constrained_then_shortfall_is_redistributed() {
    // Arrange
    let mut arena = six_leaves(3000.0, [1000.0, 1000.0, 5000.0, 1000.0, 1000.0, 1000.0]);

    // Act
    solve(&mut arena, Strategy::Constrained, &SolveParams::default()).unwrap();

    // Assert: c and e are pinned, the rest share 7000 in proportion 22:28:15:15
    let x = contributions(&arena, &LEAVES);
    assert_all_close(&x, &[925.0, 1450.0, 0.0, 312.5, 0.0, 312.5], EPS);
    assert!((x.iter().sum::<f64>() - 3000.0).abs() < EPS);

    let active = ["a", "b", "d", "f"];
    let values: Vec<f64> = active
        .iter()
        .map(|l| arena.get_by_label(l).unwrap().data.results_value.unwrap())
        .collect();
    let total: f64 = values.iter().sum();
    let targets = [0.22 / 0.8, 0.28 / 0.8, 0.15 / 0.8, 0.15 / 0.8];
    for (v, t) in values.iter().zip(targets) {
        assert!((v / total - t).abs() < EPS);
    }
}

#[test]
fn given_scenario_c_when_solving_montecarlo_then_83_steps_and_remainder() {
    // Arrange
    let specs = vec![
        BucketSpec::new("account", 0.0, 1.0)
            .with_pool(2080.0)
            .with_children(["fund"]),
        BucketSpec::new("fund", 1000.0, 1.0),
    ];
    let mut arena = TreeBuilder::new().build(&specs).unwrap();

    // Act
    let report = solve(&mut arena, Strategy::MonteCarlo, &params_with_seed(25.0, 1)).unwrap();

    // Assert
    assert_eq!(contributions(&arena, &["fund"]), vec![2075.0]);
    assert!((report.unallocated - 5.0).abs() < EPS);
    assert!((report.allocated - 2075.0).abs() < EPS);
    assert_eq!(contributions(&arena, &["account"]), vec![2075.0]);
    assert!(!report.is_approximate());
}

#[rstest]
#[case(Strategy::Unconstrained)]
#[case(Strategy::Constrained)]
#[case(Strategy::MonteCarlo)]
fn given_nested_tree_when_solving_then_children_sum_to_parent(#[case] strategy: Strategy) {
    // Arrange
    let mut arena = nested(5000.0);

    // Act
    solve(&mut arena, strategy, &params_with_seed(1.0, 5)).unwrap();

    // Assert
    for (_, node) in arena.iter().filter(|(_, n)| !n.is_leaf()) {
        let sum: f64 = node
            .children
            .iter()
            .map(|&c| arena.get_node(c).unwrap().data.amount_to_add)
            .sum();
        assert!(
            (sum - node.data.amount_to_add).abs() < EPS,
            "{}: children add {} but parent adds {}",
            node.data.label,
            sum,
            node.data.amount_to_add
        );
    }
}

#[rstest]
#[case(Strategy::Constrained)]
#[case(Strategy::MonteCarlo)]
fn given_non_negative_strategy_when_solving_then_no_withdrawals(#[case] strategy: Strategy) {
    // Arrange: eq_us is far over target
    let mut arena = nested(500.0);

    // Act
    let report = solve(&mut arena, strategy, &params_with_seed(1.0, 8)).unwrap();

    // Assert
    for (_, node) in arena.iter() {
        assert!(node.data.amount_to_add >= 0.0, "{} withdraws", node.data.label);
    }
    assert!((report.allocated - 500.0).abs() < EPS);
}

#[rstest]
#[case(Strategy::Unconstrained)]
#[case(Strategy::Constrained)]
#[case(Strategy::MonteCarlo)]
fn given_balanced_tree_and_zero_pool_when_solving_then_all_zero(#[case] strategy: Strategy) {
    // Arrange
    let specs = vec![
        BucketSpec::new("root", 0.0, 1.0).with_children(["x", "y"]),
        BucketSpec::new("x", 0.0, 0.75).with_children(["x1", "x2"]),
        BucketSpec::new("y", 250.0, 0.25),
        BucketSpec::new("x1", 375.0, 0.5),
        BucketSpec::new("x2", 375.0, 0.5),
    ];
    let mut arena = TreeBuilder::new().build(&specs).unwrap();

    // Act
    solve(&mut arena, strategy, &params_with_seed(1.0, 2)).unwrap();

    // Assert
    for (_, node) in arena.iter() {
        assert!(node.data.amount_to_add.abs() < EPS, "{}", node.data.label);
    }
}

#[test]
fn given_montecarlo_when_solving_scenario_a_then_whole_steps_close_to_ideal() {
    // Arrange
    let mut arena = six_leaves(8000.0, [1000.0; 6]);

    // Act
    let report = solve(&mut arena, Strategy::MonteCarlo, &params_with_seed(25.0, 42)).unwrap();

    // Assert
    let x = contributions(&arena, &LEAVES);
    for value in &x {
        let steps = value / 25.0;
        assert!((steps - steps.round()).abs() < 1e-9, "{} is not a whole step", value);
    }
    assert!((x.iter().sum::<f64>() - 8000.0).abs() < EPS);
    assert_all_close(&x, &[2080.0, 2920.0, 400.0, 1100.0, 400.0, 1100.0], 25.0 + EPS);
    assert_eq!(report.unallocated, 0.0);
}

#[test]
fn given_same_seed_when_solving_twice_then_identical_trees() {
    // Arrange
    let mut first = nested(777.0);
    let mut second = nested(777.0);

    // Act
    solve(&mut first, Strategy::MonteCarlo, &params_with_seed(1.0, 99)).unwrap();
    solve(&mut second, Strategy::MonteCarlo, &params_with_seed(1.0, 99)).unwrap();

    // Assert
    let labels: Vec<String> = first.iter().map(|(_, n)| n.data.label.clone()).collect();
    let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
    assert_eq!(contributions(&first, &labels), contributions(&second, &labels));
}

#[test]
fn given_pool_below_step_when_solving_montecarlo_then_infeasible_and_untouched() {
    // Arrange
    let mut arena = six_leaves(10.0, [1000.0; 6]);
    let before = arena.clone();

    // Act
    let err = solve(&mut arena, Strategy::MonteCarlo, &params_with_seed(25.0, 1)).unwrap_err();

    // Assert
    assert!(matches!(
        err,
        DomainError::Infeasible(InfeasibleError::PoolBelowStep { .. })
    ));
    assert_eq!(
        contributions(&arena, &LEAVES),
        contributions(&before, &LEAVES)
    );
    assert!(arena.iter().all(|(_, n)| !n.data.is_solved()));
}

#[test]
fn given_invalid_step_when_solving_montecarlo_then_infeasible() {
    let mut arena = six_leaves(100.0, [1000.0; 6]);
    let err = solve(&mut arena, Strategy::MonteCarlo, &params_with_seed(0.0, 1)).unwrap_err();
    assert!(matches!(
        err,
        DomainError::Infeasible(InfeasibleError::InvalidStepSize(_))
    ));
}

#[test]
fn given_negative_pool_when_solving_unconstrained_then_withdraws_evenly_by_ratio() {
    // Arrange
    let mut arena = six_leaves(-600.0, [1000.0; 6]);

    // Act
    solve(&mut arena, Strategy::Unconstrained, &SolveParams::default()).unwrap();

    // Assert: total after is 5400
    let x = contributions(&arena, &LEAVES);
    assert!((x.iter().sum::<f64>() + 600.0).abs() < EPS);
    assert!((x[0] - (0.22 * 5400.0 - 1000.0)).abs() < EPS);
}

#[test]
fn given_forest_when_solving_then_each_root_uses_its_own_seed() {
    // Arrange
    let specs = vec![
        BucketSpec::new("ira", 0.0, 1.0)
            .with_pool(100.0)
            .with_children(["ira_a", "ira_b"]),
        BucketSpec::new("ira_a", 0.0, 0.5),
        BucketSpec::new("ira_b", 0.0, 0.5),
        BucketSpec::new("brokerage", 0.0, 1.0)
            .with_pool(300.0)
            .with_children(["br_x"]),
        BucketSpec::new("br_x", 10.0, 1.0),
    ];
    let mut arena = TreeBuilder::new().build(&specs).unwrap();

    // Act
    let report = solve(&mut arena, Strategy::Constrained, &SolveParams::default()).unwrap();

    // Assert
    assert_all_close(
        &contributions(&arena, &["ira_a", "ira_b", "br_x"]),
        &[50.0, 50.0, 300.0],
        EPS,
    );
    assert!((report.allocated - 400.0).abs() < EPS);
    let root = arena.get_by_label("brokerage").unwrap();
    assert_eq!(root.data.results_ratio, Some(1.0));
    assert!((root.data.results_value.unwrap() - 310.0).abs() < EPS);
}

#[test]
fn given_custom_level_solver_when_driving_then_injected_rng_is_used() {
    // Arrange
    let mut arena = nested(1000.0);
    let mut solver = MonteCarloSolver::new(10.0, StdRng::seed_from_u64(3)).unwrap();

    // Act
    let report = solve_with(&mut arena, &mut solver, None).unwrap();

    // Assert
    assert!((report.allocated - 1000.0).abs() < EPS);
    let mut reference = nested(1000.0);
    solve_with(&mut reference, &mut UnconstrainedSolver, Some(1000.0)).unwrap();
    assert!(reference.iter().all(|(_, n)| n.data.is_solved()));
}
