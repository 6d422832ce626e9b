use crate::core::errors::GateError;
use crate::core::utils;
use ndarray::{Array2, arr2};
use num_complex::Complex64;

/// Represents a quantum gate.
///
/// A gate is defined by its unitary matrix and the number of qubits it acts on.
#[derive(Clone, Debug)]
pub struct Gate {
    /// The unitary matrix of the gate.
    pub matrix: Array2<Complex64>,
    /// The number of qubits the gate acts on.
    pub num_qubits: usize,
}

impl Gate {
    /// Creates a new `Gate` from a unitary matrix.
    ///
    /// # Arguments
    ///
    /// * `matrix` - A square, unitary `Array2<Complex64>`.
    ///
    /// # Errors
    ///
    /// Returns a `GateError` if:
    /// - The matrix is not square.
    /// - The matrix dimensions are not a power of 2.
    /// - The matrix is not unitary.
    pub fn new(matrix: Array2<Complex64>) -> Result<Self, GateError> {
        let (rows, cols) = matrix.dim();

        if rows != cols {
            return Err(GateError::NotSquareMatrix);
        }

        if !rows.is_power_of_two() {
            return Err(GateError::InvalidDimensions);
        }

        if !Self::check_unitary(&matrix) {
            return Err(GateError::NonUnitary);
        }

        let num_qubits = rows.trailing_zeros() as usize;

        Ok(Self { matrix, num_qubits })
    }

    /// Single-qubit gate from a matrix known to be unitary.
    fn single(matrix: Array2<Complex64>) -> Gate {
        Gate {
            matrix,
            num_qubits: 1,
        }
    }

    /// Checks if a given matrix is unitary
    fn check_unitary(matrix: &Array2<Complex64>) -> bool {
        let (rows, _) = matrix.dim();
        let eye = Array2::<Complex64>::eye(rows);

        let u_dagger = matrix.t().mapv(|x| x.conj());
        let product = matrix.dot(&u_dagger);

        product
            .iter()
            .zip(eye.iter())
            .all(|(a, b)| (*a - *b).norm() < 1e-6)
    }

    /// Expands a gate to act on a larger system of qubits.
    ///
    /// The result applies `gate` to `targets` when every qubit in `controls`
    /// is set, and identity everywhere else.
    ///
    /// # Errors
    ///
    /// Returns `GateError` if:
    /// - Duplicate indices are found in `targets` or `controls`.
    /// - A qubit is used as both control and target.
    pub fn expand_gate(
        num_total_qubits: usize,
        gate: &Gate,
        targets: &[usize],
        controls: &[usize],
    ) -> Result<Gate, GateError> {
        if let Some(dup) = utils::find_duplicate(targets) {
            return Err(GateError::DuplicateQubit(dup));
        }

        if let Some(dup) = utils::find_duplicate(controls) {
            return Err(GateError::DuplicateQubit(dup));
        }

        if let Some(&c) = controls.iter().find(|c| targets.contains(c)) {
            return Err(GateError::ControlTargetOverlap(c));
        }

        Ok(Gate {
            matrix: utils::expand_operator(num_total_qubits, &gate.matrix, targets, controls),
            num_qubits: num_total_qubits,
        })
    }

    // --- Standard Gates ---

    /// Creates an Identity gate.
    pub fn i() -> Gate {
        Gate::single(Array2::<Complex64>::eye(2))
    }

    /// Creates a Pauli-X gate (NOT gate).
    pub fn x() -> Gate {
        Gate::single(arr2(&[
            [Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)],
        ]))
    }

    /// Creates a Pauli-Z gate.
    pub fn z() -> Gate {
        Gate::single(arr2(&[
            [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)],
            [Complex64::new(0.0, 0.0), Complex64::new(-1.0, 0.0)],
        ]))
    }

    /// Creates a Hadamard gate.
    pub fn h() -> Gate {
        let factor = 1.0 / 2.0_f64.sqrt();
        Gate::single(arr2(&[
            [Complex64::new(factor, 0.0), Complex64::new(factor, 0.0)],
            [Complex64::new(factor, 0.0), Complex64::new(-factor, 0.0)],
        ]))
    }

    /// Creates a rotation of `theta` radians about the Y axis.
    ///
    /// Applying `ry(-phi)` before a Z measurement measures along the Bloch
    /// direction at angle `phi` in the X-Z plane.
    pub fn ry(theta: f64) -> Gate {
        let (sin, cos) = (theta / 2.0).sin_cos();
        Gate::single(arr2(&[
            [Complex64::new(cos, 0.0), Complex64::new(-sin, 0.0)],
            [Complex64::new(sin, 0.0), Complex64::new(cos, 0.0)],
        ]))
    }

    /// Creates a CNOT (Controlled-NOT) gate with qubit 0 as control.
    pub fn cnot() -> Gate {
        Gate {
            matrix: utils::expand_operator(2, &Gate::x().matrix, &[1], &[0]),
            num_qubits: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn standard_gates_are_unitary() {
        for gate in [Gate::i(), Gate::x(), Gate::z(), Gate::h(), Gate::ry(PI / 4.0), Gate::cnot()] {
            assert!(Gate::check_unitary(&gate.matrix));
        }
    }

    #[test]
    fn non_unitary_matrix_is_rejected() {
        let m = arr2(&[
            [Complex64::new(1.0, 0.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)],
        ]);
        assert!(matches!(Gate::new(m), Err(GateError::NonUnitary)));
    }

    #[test]
    fn overlapping_control_and_target_is_rejected() {
        let err = Gate::expand_gate(2, &Gate::x(), &[0], &[0]).unwrap_err();
        assert!(matches!(err, GateError::ControlTargetOverlap(0)));
    }

    #[test]
    fn half_turn_about_y_flips_like_x_up_to_phase() {
        let ry = Gate::ry(PI);
        assert!((ry.matrix[[1, 0]].re - 1.0).abs() < 1e-12);
        assert!((ry.matrix[[0, 1]].re + 1.0).abs() < 1e-12);
        assert!(ry.matrix[[0, 0]].norm() < 1e-12);
    }
}
