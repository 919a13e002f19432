//! Structural checks on layouts given as plain nested sequences
//! `replications -> blocks -> treatment ids`.

use crate::concurrence_matrix::ConcurrenceMatrix;
use crate::error::{LatticeError, Result};
use crate::layout::Layout;

/// True when every block has `block_size` plots and every replication holds
/// each of the `block_size²` treatments exactly once.
pub fn validate_layout(replications: &[Vec<Vec<usize>>], block_size: usize) -> bool {
    ensure_valid_layout(replications, block_size).is_ok()
}

/// Like [`validate_layout`] but reports the first invariant that fails.
pub fn ensure_valid_layout(replications: &[Vec<Vec<usize>>], block_size: usize) -> Result<()> {
    if block_size < 2 {
        return Err(LatticeError::invalid_layout(format!(
            "block size must be at least 2, got {block_size}"
        )));
    }
    if replications.is_empty() {
        return Err(LatticeError::invalid_layout("layout has no replications"));
    }
    let treatments = block_size * block_size;

    for (rep_idx, rep) in replications.iter().enumerate() {
        let mut seen = vec![false; treatments];
        for (block_idx, block) in rep.iter().enumerate() {
            if block.len() != block_size {
                return Err(LatticeError::invalid_layout(format!(
                    "replication {rep_idx} block {block_idx} has {} plots, expected {block_size}",
                    block.len()
                )));
            }
            for &treatment in block {
                if treatment >= treatments {
                    return Err(LatticeError::invalid_layout(format!(
                        "treatment {treatment} in replication {rep_idx} is outside 0..{treatments}"
                    )));
                }
                if seen[treatment] {
                    return Err(LatticeError::invalid_layout(format!(
                        "treatment {treatment} appears more than once in replication {rep_idx}"
                    )));
                }
                seen[treatment] = true;
            }
        }
        if let Some(missing) = seen.iter().position(|&s| !s) {
            return Err(LatticeError::invalid_layout(format!(
                "treatment {missing} is missing from replication {rep_idx}"
            )));
        }
    }
    Ok(())
}

/// Rejects a layout in which any treatment pair shares more than `max` blocks.
pub fn ensure_concurrence_at_most(layout: &Layout, max: usize) -> Result<()> {
    let concurrence = ConcurrenceMatrix::from_layout(layout);
    match concurrence.first_pair_above(max) {
        Some((first, second, count)) => Err(LatticeError::ConcurrenceExceeded {
            first,
            second,
            count,
            max,
        }),
        None => Ok(()),
    }
}
