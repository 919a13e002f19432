use nalgebra::DMatrix;

use crate::layout::Layout;

/// Pairwise concurrences: entry (i, j) counts the blocks holding both i and j.
/// Symmetric with a zero diagonal.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct ConcurrenceMatrix {
    pub concurrence: DMatrix<usize>,
}

impl ConcurrenceMatrix {
    pub fn from_layout(layout: &Layout) -> Self {
        Self::from_blocks(layout.treatments(), layout.blocks().map(|b| b.treatments()))
    }

    /// Accumulates every unordered pair co-located in each block.
    pub fn from_blocks<'a, I>(treatments: usize, blocks: I) -> Self
    where
        I: IntoIterator<Item = &'a [usize]>,
    {
        let mut concurrence: DMatrix<usize> = DMatrix::zeros(treatments, treatments);
        for block in blocks {
            for (i, &elem_i) in block.iter().enumerate() {
                for &elem_j in &block[i + 1..] {
                    if elem_i == elem_j {
                        continue;
                    }
                    concurrence[(elem_i, elem_j)] += 1;
                    concurrence[(elem_j, elem_i)] += 1;
                }
            }
        }
        Self { concurrence }
    }

    pub fn treatments(&self) -> usize {
        self.concurrence.nrows()
    }

    fn off_diagonal(&self) -> impl Iterator<Item = usize> + '_ {
        let n = self.treatments();
        (0..n).flat_map(move |i| ((i + 1)..n).map(move |j| self.concurrence[(i, j)]))
    }

    pub fn max_concurrence(&self) -> usize {
        self.off_diagonal().max().unwrap_or(0)
    }

    /// Mean concurrence over the n(n-1)/2 treatment pairs.
    pub fn lambda(&self) -> f64 {
        let n = self.treatments();
        if n < 2 {
            return 0.0;
        }
        let cells = n * (n - 1) / 2;
        self.off_diagonal().sum::<usize>() as f64 / cells as f64
    }

    /// Population variance of the pairwise concurrences.
    pub fn variance(&self) -> f64 {
        let n = self.treatments();
        if n < 2 {
            return 0.0;
        }
        let lambda = self.lambda();
        let cells = n * (n - 1) / 2;
        self.off_diagonal()
            .map(|c| (c as f64 - lambda).powi(2))
            .sum::<f64>()
            / cells as f64
    }

    /// Every pair meets equally often.
    pub fn is_balanced(&self) -> bool {
        let mut pairs = self.off_diagonal();
        match pairs.next() {
            Some(first) => pairs.all(|c| c == first),
            None => true,
        }
    }

    /// First pair (i < j) whose concurrence exceeds `max`, with its count.
    pub fn first_pair_above(&self, max: usize) -> Option<(usize, usize, usize)> {
        let n = self.treatments();
        (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .map(|(i, j)| (i, j, self.concurrence[(i, j)]))
            .find(|&(_, _, c)| c > max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{generate_simple_lattice, generate_triple_lattice};

    #[test]
    fn test_simple_lattice_concurrences() {
        let layout = generate_simple_lattice(3).unwrap();
        let matrix = ConcurrenceMatrix::from_layout(&layout);

        assert_eq!(matrix.concurrence.shape(), (9, 9));
        assert!(matrix.concurrence.diagonal().iter().all(|&c| c == 0));
        assert_eq!(matrix.concurrence, matrix.concurrence.transpose());
        assert!(matrix.concurrence.iter().all(|&c| c <= 1));
        assert_eq!(matrix.max_concurrence(), 1);
        assert!(!matrix.is_balanced());
    }

    #[test]
    fn test_simple_lattice_pair_counts() {
        // each treatment meets 2(k-1) others once
        let k = 5;
        let matrix = ConcurrenceMatrix::from_layout(&generate_simple_lattice(k).unwrap());
        for i in 0..k * k {
            let met: usize = matrix.concurrence.row(i).iter().sum();
            assert_eq!(met, 2 * (k - 1));
        }
        let expected_lambda = (k * k * 2 * (k - 1)) as f64 / 2.0 / (k * k * (k * k - 1) / 2) as f64;
        assert!((matrix.lambda() - expected_lambda).abs() < 1e-12);
        assert!(matrix.variance() > 0.0);
    }

    #[test]
    fn test_triple_lattice_2x2_is_balanced() {
        // rows, columns and diagonals of a 2x2 square form a BIBD
        let matrix = ConcurrenceMatrix::from_layout(&generate_triple_lattice(2).unwrap());
        assert!(matrix.is_balanced());
        assert_eq!(matrix.max_concurrence(), 1);
        assert_eq!(matrix.variance(), 0.0);
        assert_eq!(matrix.first_pair_above(0), Some((0, 1, 1)));
    }

    #[test]
    fn test_from_blocks_counts_repeats() {
        let blocks: Vec<Vec<usize>> = vec![vec![0, 1], vec![0, 1], vec![2, 3]];
        let matrix = ConcurrenceMatrix::from_blocks(4, blocks.iter().map(|b| b.as_slice()));
        assert_eq!(matrix.concurrence[(1, 0)], 2);
        assert_eq!(matrix.first_pair_above(1), Some((0, 1, 2)));
    }
}
