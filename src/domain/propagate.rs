//! Per-level allocation math shared by every strategy.
//!
//! Given a pool `A` and siblings holding `v_i` with targets `r_i`, the
//! post-allocation total is `T = Σv_i + A` and the ideal contribution of each
//! sibling is `x_i = r_i * T - v_i`. The closed form is exact; `x_i` is negative
//! whenever a sibling already holds more than its share of `T`.

/// One member of a sibling set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sibling {
    pub current_value: f64,
    pub optimal_ratio: f64,
}

impl Sibling {
    pub fn new(current_value: f64, optimal_ratio: f64) -> Self {
        Self {
            current_value,
            optimal_ratio,
        }
    }
}

/// Outcome of distributing a pool over a sibling set.
#[derive(Debug, Clone, PartialEq)]
pub struct Propagation {
    /// `Σv_i + A`
    pub total_after: f64,
    /// Ideal (unconstrained) contribution per sibling, in input order
    pub contributions: Vec<f64>,
}

/// Distribute `pool` over `siblings`.
///
/// Ratios are taken relative to their sum, so a subset of a sibling set can be
/// passed as is. A set whose ratios sum to zero is split evenly.
pub fn propagate(pool: f64, siblings: &[Sibling]) -> Propagation {
    let held: f64 = siblings.iter().map(|s| s.current_value).sum();
    let total_after = held + pool;
    let ratio_sum: f64 = siblings.iter().map(|s| s.optimal_ratio).sum();
    let even = 1.0 / siblings.len().max(1) as f64;

    let contributions = siblings
        .iter()
        .map(|s| {
            let share = if ratio_sum > 0.0 {
                s.optimal_ratio / ratio_sum
            } else {
                even
            };
            share * total_after - s.current_value
        })
        .collect();

    Propagation {
        total_after,
        contributions,
    }
}

/// Sum of squared deviations between resulting and target ratios.
///
/// `values` are the post-allocation amounts; targets are renormalized like in
/// [`propagate`]. Zero when every sibling sits exactly on target.
pub fn squared_deviation(values: &[f64], siblings: &[Sibling]) -> f64 {
    let total: f64 = values.iter().sum();
    let ratio_sum: f64 = siblings.iter().map(|s| s.optimal_ratio).sum();
    if total <= 0.0 || ratio_sum <= 0.0 {
        return 0.0;
    }
    values
        .iter()
        .zip(siblings)
        .map(|(v, s)| {
            let d = v / total - s.optimal_ratio / ratio_sum;
            d * d
        })
        .sum()
}
