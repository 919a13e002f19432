use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::error::{LatticeError, Result};
use crate::validate::ensure_valid_layout;

/// Largest block size the diagonal construction is supported for in a triple lattice.
pub const MAX_TRIPLE_BLOCK_SIZE: usize = 4;

/// Supported lattice variants. Chosen once when a design is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatticeType {
    /// Two replications: rows and columns of the k x k square.
    Simple,
    /// Three replications: rows, columns and diagonals of the k x k square.
    Triple,
}

impl LatticeType {
    pub fn from_replications(replications: usize) -> Result<Self> {
        match replications {
            2 => Ok(Self::Simple),
            3 => Ok(Self::Triple),
            other => Err(LatticeError::InvalidReplications(other)),
        }
    }

    pub fn replications(&self) -> usize {
        match self {
            Self::Simple => 2,
            Self::Triple => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Triple => "triple",
        }
    }

    pub fn max_block_size(&self) -> usize {
        match self {
            Self::Simple => usize::MAX,
            Self::Triple => MAX_TRIPLE_BLOCK_SIZE,
        }
    }

    /// Checks that `k` is constructible for this variant.
    pub fn check_block_size(&self, k: usize) -> Result<()> {
        if k < 2 || k > self.max_block_size() {
            return Err(LatticeError::BlockSizeOutOfRange {
                k,
                min: 2,
                max: self.max_block_size(),
                lattice: self.name(),
            });
        }
        Ok(())
    }
}

/// Returns k when `treatments` is k² with k >= 2.
pub fn block_size_for(treatments: usize) -> Result<usize> {
    let k = (treatments as f64).sqrt().round() as usize;
    if k < 2 || k * k != treatments {
        return Err(LatticeError::NotPerfectSquare(treatments));
    }
    Ok(k)
}

/// A set of treatment ids sharing one incomplete block, in plot order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block(Vec<usize>);

impl Block {
    pub fn treatments(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, treatment: usize) -> bool {
        self.0.contains(&treatment)
    }
}

/// One complete replicate: its blocks partition the treatment set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replication(Vec<Block>);

impl Replication {
    pub fn blocks(&self) -> &[Block] {
        &self.0
    }
}

/// Assignment of treatments to plots: replications of blocks of plots.
///
/// Only constructed through [`Layout::new`] or the generators, so every
/// instance satisfies the partition invariant for its block size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    block_size: usize,
    replications: Vec<Replication>,
}

impl Layout {
    /// Builds a layout from nested sequences, rejecting malformed input.
    ///
    /// # Errors
    ///
    /// Returns [`LatticeError::InvalidLayout`] when a block has the wrong size,
    /// a treatment repeats within a replication, or a replication misses a treatment.
    pub fn new(replications: Vec<Vec<Vec<usize>>>, block_size: usize) -> Result<Self> {
        ensure_valid_layout(&replications, block_size)?;
        Ok(Self::from_nested_unchecked(replications, block_size))
    }

    fn from_nested_unchecked(replications: Vec<Vec<Vec<usize>>>, block_size: usize) -> Self {
        let replications = replications
            .into_iter()
            .map(|rep| Replication(rep.into_iter().map(Block).collect()))
            .collect();
        Self {
            block_size,
            replications,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn treatments(&self) -> usize {
        self.block_size * self.block_size
    }

    pub fn replications(&self) -> &[Replication] {
        &self.replications
    }

    pub fn n_replications(&self) -> usize {
        self.replications.len()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.replications.iter().flat_map(|rep| rep.blocks().iter())
    }

    /// Treatment sown in a given plot.
    pub fn treatment_at(&self, rep: usize, block: usize, plot: usize) -> usize {
        self.replications[rep].0[block].0[plot]
    }

    /// Back to plain nested sequences, the form the validator works on.
    pub fn to_nested(&self) -> Vec<Vec<Vec<usize>>> {
        self.replications
            .iter()
            .map(|rep| rep.0.iter().map(|block| block.0.clone()).collect())
            .collect()
    }

    /// One row per block (replication-major), one column per plot.
    pub fn to_block_array(&self) -> DMatrix<usize> {
        let rows: Vec<usize> = self.blocks().flat_map(|b| b.0.iter().copied()).collect();
        DMatrix::from_row_slice(self.n_replications() * self.block_size, self.block_size, &rows)
    }

    /// Block array with each block sorted, and blocks sorted within their replication.
    pub fn as_sorted(&self) -> DMatrix<usize> {
        let mut nested = self.to_nested();
        for rep in nested.iter_mut() {
            for block in rep.iter_mut() {
                block.sort_unstable();
            }
            rep.sort();
        }
        Self::from_nested_unchecked(nested, self.block_size).to_block_array()
    }

    /// Field randomization: shuffles block order inside each replication and
    /// plot order inside each block. Block membership is untouched.
    pub fn randomized<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut nested = self.to_nested();
        for rep in nested.iter_mut() {
            rep.shuffle(rng);
            for block in rep.iter_mut() {
                block.shuffle(rng);
            }
        }
        Self::from_nested_unchecked(nested, self.block_size)
    }
}

/// Simple lattice: rows then columns of the k x k square, treatment `i*k + j` at cell (i, j).
pub fn generate_simple_lattice(k: usize) -> Result<Layout> {
    generate_layout(k, LatticeType::Simple)
}

/// Triple lattice: the simple lattice plus the diagonals `(i, (i + b) mod k)`.
pub fn generate_triple_lattice(k: usize) -> Result<Layout> {
    generate_layout(k, LatticeType::Triple)
}

/// Builds the standard (unrandomized) layout for a lattice of block size `k`.
///
/// # Errors
///
/// [`LatticeError::BlockSizeOutOfRange`] when `k < 2`, or `k` exceeds
/// [`MAX_TRIPLE_BLOCK_SIZE`] for a triple lattice.
pub fn generate_layout(k: usize, lattice: LatticeType) -> Result<Layout> {
    lattice.check_block_size(k)?;

    let rows: Vec<Vec<usize>> = (0..k).map(|i| (0..k).map(|j| i * k + j).collect()).collect();
    let columns: Vec<Vec<usize>> = (0..k).map(|j| (0..k).map(|i| i * k + j).collect()).collect();

    let mut replications = vec![rows, columns];
    if lattice == LatticeType::Triple {
        // two cells on one diagonal never share a row or a column
        let diagonals = (0..k)
            .map(|b| (0..k).map(|i| i * k + (i + b) % k).collect())
            .collect();
        replications.push(diagonals);
    }

    debug!(k, lattice = lattice.name(), reps = replications.len(), "generated lattice layout");
    Ok(Layout::from_nested_unchecked(replications, k))
}
