//! Tree builder: resolves child references and validates a bucket forest.

use std::collections::{HashMap, HashSet};

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::BucketArena;
use crate::domain::entities::{Bucket, BucketSpec, ChildRef};
use crate::domain::error::ValidationError;

/// Default tolerance for sibling ratios summing to 1.
pub const DEFAULT_RATIO_TOLERANCE: f64 = 1e-6;

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, ValidationError>;

/// Constructs a validated bucket forest from a flat list of specs.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    ratio_tolerance: f64,
    normalize_ratios: bool,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            ratio_tolerance: DEFAULT_RATIO_TOLERANCE,
            normalize_ratios: false,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.ratio_tolerance = tolerance;
        self
    }

    /// Rescale every sibling set to sum to 1 before validating, so ratios
    /// may be given as percentages or raw weights.
    pub fn with_normalized_ratios(mut self, normalize: bool) -> Self {
        self.normalize_ratios = normalize;
        self
    }

    /// Build the forest. Roots are the specs no other spec claims as a child,
    /// in declaration order.
    #[instrument(level = "debug", skip(self, specs), fields(n = specs.len()))]
    pub fn build(&self, specs: &[BucketSpec]) -> TreeResult<BucketArena> {
        if specs.is_empty() {
            return Err(ValidationError::Empty);
        }

        let positions = index_labels(specs)?;
        let children = resolve_children(specs, &positions)?;
        let owners = assign_owners(specs, &children)?;

        let mut buckets: Vec<Bucket> = specs.iter().map(Bucket::from).collect();
        check_values(&buckets)?;

        let roots: Vec<usize> = (0..specs.len()).filter(|&i| owners[i].is_none()).collect();
        if roots.is_empty() {
            return Err(ValidationError::CycleDetected(specs[0].label.clone()));
        }
        for (i, bucket) in buckets.iter().enumerate() {
            if owners[i].is_some() && bucket.amount_to_add != 0.0 {
                return Err(ValidationError::SeedOnInnerNode {
                    label: bucket.label.clone(),
                    value: bucket.amount_to_add,
                });
            }
        }

        if self.normalize_ratios {
            normalize(&mut buckets, &children, &roots);
        }
        check_ratio_range(&buckets)?;
        self.check_ratio_sums(&buckets, &children)?;

        let mut arena = BucketArena::new();
        let mut visited = HashSet::new();
        for &root in &roots {
            let mut stack: Vec<(usize, Option<Index>)> = vec![(root, None)];
            while let Some((current, parent_idx)) = stack.pop() {
                if !visited.insert(current) {
                    return Err(ValidationError::CycleDetected(buckets[current].label.clone()));
                }
                let current_idx = arena.insert_node(buckets[current].clone(), parent_idx);
                // reversed so children are inserted in declaration order
                for &child in children[current].iter().rev() {
                    stack.push((child, Some(current_idx)));
                }
            }
        }

        // Nodes not reachable from any root sit on a cycle of ownership
        if let Some(unreached) = (0..specs.len()).find(|i| !visited.contains(i)) {
            return Err(ValidationError::CycleDetected(specs[unreached].label.clone()));
        }

        self.roll_up_current_values(&mut arena)?;
        debug!(
            "built {} buckets in {} tree(s), depth {}",
            arena.len(),
            arena.roots().len(),
            arena.depth()
        );
        Ok(arena)
    }

    fn check_ratio_sums(&self, buckets: &[Bucket], children: &[Vec<usize>]) -> TreeResult<()> {
        for (parent, kids) in children.iter().enumerate() {
            if kids.is_empty() {
                continue;
            }
            let sum: f64 = kids.iter().map(|&c| buckets[c].optimal_ratio).sum();
            if (sum - 1.0).abs() > self.ratio_tolerance {
                return Err(ValidationError::RatiosDoNotSum {
                    parent: buckets[parent].label.clone(),
                    sum,
                });
            }
        }
        Ok(())
    }

    /// Inner buckets hold exactly what their children hold. A declared value of 0
    /// means "derive from the children"; any other value must agree with them.
    fn roll_up_current_values(&self, arena: &mut BucketArena) -> TreeResult<()> {
        let order: Vec<Index> = arena.iter_postorder().map(|(idx, _)| idx).collect();
        for idx in order {
            let kids = arena.children(idx).to_vec();
            if kids.is_empty() {
                continue;
            }
            let sum: f64 = kids
                .iter()
                .filter_map(|&c| arena.get_node(c))
                .map(|c| c.data.current_value)
                .sum();
            if let Some(node) = arena.get_node_mut(idx) {
                let declared = node.data.current_value;
                if declared != 0.0 && (declared - sum).abs() > self.ratio_tolerance * sum.max(1.0) {
                    return Err(ValidationError::InnerValueMismatch {
                        label: node.data.label.clone(),
                        declared,
                        children: sum,
                    });
                }
                node.data.current_value = sum;
            }
        }
        Ok(())
    }
}

fn index_labels(specs: &[BucketSpec]) -> TreeResult<HashMap<&str, usize>> {
    let mut positions = HashMap::with_capacity(specs.len());
    for (i, spec) in specs.iter().enumerate() {
        if spec.label.trim().is_empty() {
            return Err(ValidationError::EmptyLabel);
        }
        if positions.insert(spec.label.as_str(), i).is_some() {
            return Err(ValidationError::DuplicateLabel(spec.label.clone()));
        }
    }
    Ok(positions)
}

fn resolve_children(
    specs: &[BucketSpec],
    positions: &HashMap<&str, usize>,
) -> TreeResult<Vec<Vec<usize>>> {
    let mut resolved = Vec::with_capacity(specs.len());
    for (i, spec) in specs.iter().enumerate() {
        let mut kids: Vec<usize> = Vec::new();
        for raw in &spec.children {
            let child_ref = ChildRef::parse(raw).map_err(|e| ValidationError::InvalidPattern {
                parent: spec.label.clone(),
                pattern: raw.clone(),
                message: e.to_string(),
            })?;
            let matched: Vec<usize> = match &child_ref {
                ChildRef::Exact(label) => {
                    if *label == spec.label {
                        return Err(ValidationError::SelfReference(spec.label.clone()));
                    }
                    let pos = positions.get(label.as_str()).copied().ok_or_else(|| {
                        ValidationError::UnknownChild {
                            parent: spec.label.clone(),
                            child: label.clone(),
                        }
                    })?;
                    vec![pos]
                }
                ChildRef::Pattern(re) => {
                    let matched: Vec<usize> = specs
                        .iter()
                        .enumerate()
                        .filter(|(j, s)| *j != i && re.is_match(&s.label))
                        .map(|(j, _)| j)
                        .collect();
                    if matched.is_empty() {
                        return Err(ValidationError::PatternMatchesNothing {
                            parent: spec.label.clone(),
                            pattern: raw.clone(),
                        });
                    }
                    matched
                }
            };
            for pos in matched {
                if kids.contains(&pos) {
                    debug!("{} references {} twice", spec.label, specs[pos].label);
                } else {
                    kids.push(pos);
                }
            }
        }
        resolved.push(kids);
    }
    Ok(resolved)
}

fn assign_owners(specs: &[BucketSpec], children: &[Vec<usize>]) -> TreeResult<Vec<Option<usize>>> {
    let mut owners: Vec<Option<usize>> = vec![None; specs.len()];
    for (parent, kids) in children.iter().enumerate() {
        for &child in kids {
            if let Some(first) = owners[child] {
                return Err(ValidationError::MultipleParents {
                    child: specs[child].label.clone(),
                    first: specs[first].label.clone(),
                    second: specs[parent].label.clone(),
                });
            }
            owners[child] = Some(parent);
        }
    }
    Ok(owners)
}

fn check_values(buckets: &[Bucket]) -> TreeResult<()> {
    for bucket in buckets {
        if !bucket.current_value.is_finite() || bucket.current_value < 0.0 {
            return Err(ValidationError::InvalidCurrentValue {
                label: bucket.label.clone(),
                value: bucket.current_value,
            });
        }
        if !bucket.optimal_ratio.is_finite() || bucket.optimal_ratio < 0.0 {
            return Err(ValidationError::InvalidRatio {
                label: bucket.label.clone(),
                value: bucket.optimal_ratio,
            });
        }
    }
    Ok(())
}

fn check_ratio_range(buckets: &[Bucket]) -> TreeResult<()> {
    match buckets.iter().find(|b| b.optimal_ratio > 1.0) {
        Some(bucket) => Err(ValidationError::InvalidRatio {
            label: bucket.label.clone(),
            value: bucket.optimal_ratio,
        }),
        None => Ok(()),
    }
}

fn normalize(buckets: &mut [Bucket], children: &[Vec<usize>], roots: &[usize]) {
    for &root in roots {
        buckets[root].optimal_ratio = 1.0;
    }
    for kids in children.iter().filter(|k| !k.is_empty()) {
        let sum: f64 = kids.iter().map(|&c| buckets[c].optimal_ratio).sum();
        if sum > 0.0 {
            for &c in kids {
                buckets[c].optimal_ratio /= sum;
            }
        }
    }
}
