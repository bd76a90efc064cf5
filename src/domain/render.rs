//! Read-only views of a bucket forest.
//!
//! [`report_rows`] flattens the forest into display rows; [`TreeRender`]
//! builds a `termtree` for the terminal. Both work on unsolved trees and show
//! missing results as `[?]`.

use std::collections::HashMap;

use generational_arena::Index;
use termtree::Tree;
use tracing::instrument;

use crate::domain::arena::BucketArena;

/// Which columns a tree line shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Values as loaded: current value, target ratio, pool
    Input,
    /// Solved values: result value, result ratio, contribution
    Results,
}

/// One line of the solved report, in pre-order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub level: usize,
    pub label: String,
    pub current_value: f64,
    pub results_value: Option<f64>,
    pub optimal_ratio: f64,
    pub results_ratio: Option<f64>,
    pub amount_to_add: f64,
    pub is_leaf: bool,
}

pub fn report_rows(arena: &BucketArena) -> Vec<ReportRow> {
    arena
        .iter()
        .map(|(_, node)| ReportRow {
            level: node.level,
            label: node.data.label.clone(),
            current_value: node.data.current_value,
            results_value: node.data.results_value,
            optimal_ratio: node.data.optimal_ratio,
            results_ratio: node.data.results_ratio,
            amount_to_add: node.data.amount_to_add,
            is_leaf: node.is_leaf(),
        })
        .collect()
}

/// Format an amount with thousands separators and two decimals, right
/// aligned to `width`.
pub fn format_amount(value: f64, width: usize) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    // -0.00 reads as 0.00
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{:>width$}", format!("{}{}.{}", sign, grouped, frac_part), width = width)
}

const AMOUNT_WIDTH: usize = 9;

fn amount_cell(value: Option<f64>) -> String {
    value
        .map(|v| format_amount(v, AMOUNT_WIDTH))
        .unwrap_or_else(|| "?".to_string())
}

fn ratio_cell(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| "?".to_string())
}

impl ReportRow {
    pub fn line(&self, view: View, label_width: usize) -> String {
        match view {
            View::Input => format!(
                "{:<lw$} level=[{}] current_value=[{}] optimal_ratio=[{}] amount_to_add=[{}]",
                self.label,
                self.level,
                amount_cell(Some(self.current_value)),
                ratio_cell(Some(self.optimal_ratio)),
                amount_cell(Some(self.amount_to_add)),
                lw = label_width
            ),
            View::Results => {
                // Before solving, amount_to_add is still the seed pool
                let contribution = self.results_value.map(|_| self.amount_to_add);
                format!(
                    "{:<lw$} level=[{}] results_value=[{}] results_ratio=[{}] amount_to_add=[{}]",
                    self.label,
                    self.level,
                    amount_cell(self.results_value),
                    ratio_cell(self.results_ratio),
                    amount_cell(contribution),
                    lw = label_width
                )
            }
        }
    }
}

pub trait TreeRender {
    fn to_tree(&self, view: View) -> Tree<String>;
}

impl TreeRender for BucketArena {
    #[instrument(level = "debug", skip(self))]
    fn to_tree(&self, view: View) -> Tree<String> {
        let rows: HashMap<Index, ReportRow> = self
            .iter()
            .zip(report_rows(self))
            .map(|((idx, _), row)| (idx, row))
            .collect();
        let label_width = rows.values().map(|r| r.label.len()).max().unwrap_or(0);

        fn build(
            arena: &BucketArena,
            idx: Index,
            rows: &HashMap<Index, ReportRow>,
            view: View,
            label_width: usize,
        ) -> Tree<String> {
            let line = rows
                .get(&idx)
                .map(|row| row.line(view, label_width))
                .unwrap_or_default();
            let leaves: Vec<Tree<String>> = arena
                .children(idx)
                .iter()
                .map(|&child| build(arena, child, rows, view, label_width))
                .collect();
            Tree::new(line).with_leaves(leaves)
        }

        match self.roots() {
            [] => Tree::new("Empty tree".to_string()),
            [root] => build(self, *root, &rows, view, label_width),
            roots => {
                let leaves: Vec<Tree<String>> = roots
                    .iter()
                    .map(|&root| build(self, root, &rows, view, label_width))
                    .collect();
                Tree::new(format!("forest of {} trees", roots.len())).with_leaves(leaves)
            }
        }
    }
}
