//! Utility functions for quantum operations.
//!
//! This module contains helper functions for:
//! - Matrix operations (trace, outer product).
//! - Operator expansion to larger systems.
//! - Completeness checks for measurements and noise channels.
//! - Bit manipulation for state indices.

use ndarray::{Array1, Array2};
use num_complex::Complex64;

/// Computes the trace of a matrix (sum of diagonal elements).
pub fn trace(matrix: &Array2<Complex64>) -> Complex64 {
    matrix.diag().sum()
}

/// Generates the full operator matrix ($2^N \times 2^N$) for the whole system.
///
/// It expands a local operator acting on `targets` (and controlled by `controls`)
/// to an operator on the full system of `num_total_qubits`.
///
/// # Arguments
///
/// * `num_total_qubits` - Total number of qubits in the system.
/// * `matrix` - The matrix representation of the local gate.
/// * `targets` - Indices of the target qubits.
/// * `controls` - Indices of the control qubits.
pub fn expand_operator(
    num_total_qubits: usize,
    matrix: &Array2<Complex64>,
    targets: &[usize],
    controls: &[usize],
) -> Array2<Complex64> {
    let dim = 1 << num_total_qubits;
    let mut full_matrix = Array2::<Complex64>::zeros((dim, dim));

    let control_mask = controls.iter().fold(0usize, |mask, &c| mask | (1 << c));
    let target_mask = targets.iter().fold(0usize, |mask, &t| mask | (1 << t));
    // Bits outside the targets are carried over unchanged
    let passive_mask = !target_mask;

    for col_idx in 0..dim {
        // Basis states with an unset control bit are left untouched
        if (col_idx & control_mask) != control_mask {
            full_matrix[[col_idx, col_idx]] = Complex64::new(1.0, 0.0);
            continue;
        }

        let small_col = extract_bits(col_idx, targets);
        for small_row in 0..matrix.nrows() {
            let val = matrix[[small_row, small_col]];
            if val.norm_sqr() < f64::EPSILON {
                continue;
            }
            let row_idx = (col_idx & passive_mask) | deposit_bits(small_row, targets);
            full_matrix[[row_idx, col_idx]] = val;
        }
    }
    full_matrix
}

/// Gathers the bits of `value` found at `indices` into a compact integer.
fn extract_bits(value: usize, indices: &[usize]) -> usize {
    indices
        .iter()
        .enumerate()
        .filter(|&(_, &pos)| (value >> pos) & 1 == 1)
        .fold(0, |acc, (i, _)| acc | (1 << i))
}

/// Scatters bits from `compact_value` into the positions specified by `indices`.
fn deposit_bits(compact_value: usize, indices: &[usize]) -> usize {
    indices
        .iter()
        .enumerate()
        .filter(|&(i, _)| (compact_value >> i) & 1 == 1)
        .fold(0, |acc, (_, &pos)| acc | (1 << pos))
}

/// Find duplicate in a slice of usize
pub fn find_duplicate(indices: &[usize]) -> Option<usize> {
    let mut seen = std::collections::HashSet::new();
    indices.iter().find(|&&idx| !seen.insert(idx)).copied()
}

/// Checks completeness relation for measurement and Kraus operators.
///
/// Verifies if $\sum M_k^\dagger M_k = I$.
pub fn check_completeness(ops: &[Array2<Complex64>], dim: usize) -> bool {
    let eye = Array2::<Complex64>::eye(dim);
    let sum = ops
        .iter()
        .fold(Array2::<Complex64>::zeros((dim, dim)), |acc, op| {
            let dag = op.t().mapv(|c| c.conj());
            acc + dag.dot(op)
        });
    sum.iter()
        .zip(eye.iter())
        .all(|(a, b)| (a - b).norm() < 1e-9)
}

/// Computes the outer product of two vectors $|a\rangle\langle b|$.
pub fn outer_product(a: &Array1<Complex64>, b: &Array1<Complex64>) -> Array2<Complex64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j].conj())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn bit_gather_and_scatter_are_inverse() {
        let targets = [2, 0];
        for compact in 0..4 {
            let wide = deposit_bits(compact, &targets);
            assert_eq!(extract_bits(wide, &targets), compact);
        }
        assert_eq!(deposit_bits(0b01, &targets), 0b100);
    }

    #[test]
    fn expanding_x_on_second_qubit_flips_bit_one() {
        let x = array![
            [Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)]
        ];
        let full = expand_operator(2, &x, &[1], &[]);
        // |00> -> |10> in little-endian qubit order
        assert_eq!(full[[0b10, 0b00]], Complex64::new(1.0, 0.0));
        assert_eq!(full[[0b00, 0b00]], Complex64::new(0.0, 0.0));
        assert!(check_completeness(&[full], 4));
    }

    #[test]
    fn duplicates_are_reported() {
        assert_eq!(find_duplicate(&[0, 1, 0]), Some(0));
        assert_eq!(find_duplicate(&[0, 1, 2]), None);
    }
}
