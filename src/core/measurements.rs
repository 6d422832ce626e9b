use crate::core::errors::MeasurementError;
use crate::core::utils;
use ndarray::{Array1, Array2, array};
use num_complex::Complex64;

#[derive(Clone, Debug)]
pub struct Measurement {
    /// List of measurement operators
    pub operators: Vec<Array2<Complex64>>,
    /// Value associated with each operator's outcome
    pub values: Vec<f64>,
    /// Number of qubits the measurement acts on
    pub num_qubits: usize,
}

impl Measurement {
    pub fn new(
        operators: Vec<Array2<Complex64>>,
        values: Vec<f64>,
    ) -> Result<Self, MeasurementError> {
        if operators.len() != values.len() {
            return Err(MeasurementError::CountMismatch {
                ops: operators.len(),
                vals: values.len(),
            });
        }

        let Some(first) = operators.first() else {
            return Err(MeasurementError::InvalidDimensions);
        };

        let (rows, cols) = first.dim();
        if rows != cols || !rows.is_power_of_two() {
            return Err(MeasurementError::InvalidDimensions);
        }
        // log_2 as rows is power of two
        let num_qubits = rows.trailing_zeros() as usize;

        if operators.iter().any(|op| op.dim() != (rows, cols)) {
            return Err(MeasurementError::InvalidDimensions);
        }

        if !utils::check_completeness(&operators, rows) {
            return Err(MeasurementError::NotComplete);
        }

        Ok(Self {
            operators,
            values,
            num_qubits,
        })
    }

    /// Projective single-qubit measurement onto two orthonormal vectors.
    fn projective(v0: Array1<Complex64>, v1: Array1<Complex64>) -> Measurement {
        Measurement {
            operators: vec![utils::outer_product(&v0, &v0), utils::outer_product(&v1, &v1)],
            values: vec![0.0, 1.0],
            num_qubits: 1,
        }
    }

    /// Expands measurement operators to a larger system
    pub fn get_expanded_operators(
        &self,
        num_total_qubits: usize,
        targets: &[usize],
    ) -> Result<Vec<Array2<Complex64>>, MeasurementError> {
        if targets.len() != self.num_qubits {
            return Err(MeasurementError::InvalidDimensions);
        }

        Ok(self
            .operators
            .iter()
            .map(|op| utils::expand_operator(num_total_qubits, op, targets, &[]))
            .collect())
    }

    /// Z basis (Computational) -> {|0>, |1>}.
    pub fn z_basis() -> Measurement {
        let v0: Array1<Complex64> = array![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)];
        let v1: Array1<Complex64> = array![Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)];

        Self::projective(v0, v1)
    }

    /// X basis (Hadamard) -> {|+>, |->}.
    pub fn x_basis() -> Measurement {
        let inv_sqrt2 = Complex64::new(1.0 / 2.0_f64.sqrt(), 0.0);

        let v_plus: Array1<Complex64> = array![inv_sqrt2, inv_sqrt2];
        let v_minus: Array1<Complex64> = array![inv_sqrt2, -inv_sqrt2];

        Self::projective(v_plus, v_minus)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementResult {
    /// Applied measurement operator index
    pub index: usize,
    /// Measurement value
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_bases_are_complete() {
        for m in [Measurement::z_basis(), Measurement::x_basis()] {
            assert!(utils::check_completeness(&m.operators, 2));
        }
    }

    #[test]
    fn mismatched_value_count_is_rejected() {
        let z = Measurement::z_basis();
        let err = Measurement::new(z.operators, vec![0.0]).unwrap_err();
        assert!(matches!(err, MeasurementError::CountMismatch { ops: 2, vals: 1 }));
    }

    #[test]
    fn incomplete_operators_are_rejected() {
        let z = Measurement::z_basis();
        let err = Measurement::new(vec![z.operators[0].clone()], vec![0.0]).unwrap_err();
        assert!(matches!(err, MeasurementError::NotComplete));
    }
}
