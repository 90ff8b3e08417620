//! Realization matcher
//!
//! The intervention ("feedback") scenario is physically initialized by
//! duplicating a subset of control trajectories into independent branches,
//! so a feedback realization has no meaningful pre-branch data of its own:
//! it borrows its parent's. This module produces a "before" dataset whose
//! realization axis lines up with a branched ensemble: parent realizations
//! are duplicated verbatim and relabeled block by block. No computation on
//! values occurs anywhere here.

use anyhow::Result;

use crate::dataset::EnsembleDataset;
use crate::error::EngineError;

/// Declared branching relationship between a control slice and the
/// ensemble branched from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchMapping {
    /// Number of parent (control) realizations the branch drew from.
    pub parent_count: usize,
    /// Branches per parent (feedback size / parent count).
    pub branch_factor: usize,
}

impl BranchMapping {
    pub fn new(parent_count: usize, branch_factor: usize) -> Result<Self> {
        if parent_count == 0 || branch_factor == 0 {
            return Err(EngineError::shape_mismatch(
                "branch mapping",
                format!(
                    "parent_count ({}) and branch_factor ({}) must be positive",
                    parent_count, branch_factor
                ),
            )
            .into());
        }
        Ok(Self {
            parent_count,
            branch_factor,
        })
    }

    /// Derive the mapping from an actual branched-ensemble size, failing
    /// with `ShapeMismatch` when the size is not an exact multiple.
    pub fn infer(branched_count: usize, branch_factor: usize, dataset: &str) -> Result<Self> {
        if branch_factor == 0 || branched_count == 0 || branched_count % branch_factor != 0 {
            return Err(EngineError::shape_mismatch(
                dataset,
                format!(
                    "{} realizations cannot be split into {} branches per parent",
                    branched_count, branch_factor
                ),
            )
            .into());
        }
        Self::new(branched_count / branch_factor, branch_factor)
    }

    /// Total realizations in the branched ensemble.
    pub fn branched_count(&self) -> usize {
        self.parent_count * self.branch_factor
    }

    /// Parent control realization of a branched realization index.
    pub fn parent_of(&self, realization: i64) -> i64 {
        realization % self.parent_count as i64
    }

    /// Display ordering that interleaves each parent with its branches
    /// (`[0, 5, 1, 6, 2, 7, 3, 8, 4, 9]` for 5 parents x 2).
    pub fn interleaved_order(&self) -> Vec<i64> {
        let parents = self.parent_count as i64;
        let mut order = Vec::with_capacity(self.branched_count());
        for parent in 0..parents {
            for block in 0..self.branch_factor as i64 {
                order.push(block * parents + parent);
            }
        }
        order
    }
}

/// Produce a "before" dataset aligned with a branched ensemble.
///
/// `before` must contain exactly the parent realization set
/// `0..parent_count`, `ShapeMismatch` otherwise. The output holds
/// `parent_count * branch_factor` realizations where block `k` is a
/// bit-identical relabeled copy of the parents; duplicated realizations
/// inherit their parent's member-id label.
pub fn matched_before(
    before: &EnsembleDataset,
    mapping: &BranchMapping,
) -> Result<EnsembleDataset> {
    let expected: Vec<i64> = (0..mapping.parent_count as i64).collect();
    let actual = before.realizations()?;
    if actual != expected {
        return Err(EngineError::shape_mismatch(
            before.name(),
            format!(
                "matcher expects parent realizations {:?}, found {:?}",
                expected, actual
            ),
        )
        .into());
    }

    let mut matched = before.clone();
    for block in 1..mapping.branch_factor as i64 {
        let copy = before.offset_realizations(block * mapping.parent_count as i64)?;
        matched = matched.concat_realizations(&copy)?;
    }
    Ok(matched.renamed(format!("{}_matched", before.name())))
}
