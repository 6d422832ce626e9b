use crate::core::errors::NoiseError;
use crate::core::utils;
use ndarray::{Array2, array};
use num_complex::Complex64;

/// A noise model for a transmission line, given by its Kraus operators.
#[derive(Clone, Debug)]
pub struct NoiseChannel {
    pub kraus_ops: Vec<Array2<Complex64>>,
    pub num_qubits: usize,
}

impl NoiseChannel {
    pub fn new(kraus_ops: Vec<Array2<Complex64>>) -> Result<Self, NoiseError> {
        let Some(first) = kraus_ops.first() else {
            return Err(NoiseError::Empty);
        };

        let (rows, cols) = first.dim();
        if rows != cols || !rows.is_power_of_two() {
            return Err(NoiseError::InvalidDimensions);
        }

        // log_2
        let num_qubits = rows.trailing_zeros() as usize;

        if kraus_ops.iter().any(|op| op.dim() != (rows, cols)) {
            return Err(NoiseError::OperatorSizeMismatch);
        }

        if !utils::check_completeness(&kraus_ops, rows) {
            return Err(NoiseError::NotComplete);
        }

        Ok(Self {
            kraus_ops,
            num_qubits,
        })
    }

    /// Expands the Kraus operators to a larger system
    pub fn get_expanded_operators(
        &self,
        num_total_qubits: usize,
        targets: &[usize],
    ) -> Result<Vec<Array2<Complex64>>, NoiseError> {
        if targets.len() != self.num_qubits {
            return Err(NoiseError::InvalidDimensions);
        }

        Ok(self
            .kraus_ops
            .iter()
            .map(|op| utils::expand_operator(num_total_qubits, op, targets, &[]))
            .collect())
    }

    /// Bit Flip Channel -> X with probability p
    pub fn bit_flip(p: f64) -> Result<NoiseChannel, NoiseError> {
        validate_prob(p)?;

        let p_stay = (1.0 - p).sqrt();
        let p_flip = p.sqrt();

        let k0 = array![
            [Complex64::new(p_stay, 0.0), Complex64::new(0.0, 0.0)],
            [Complex64::new(0.0, 0.0), Complex64::new(p_stay, 0.0)]
        ];

        let k1 = array![
            [Complex64::new(0.0, 0.0), Complex64::new(p_flip, 0.0)],
            [Complex64::new(p_flip, 0.0), Complex64::new(0.0, 0.0)]
        ];

        NoiseChannel::new(vec![k0, k1])
    }

    /// Phase Flip Channel -> Z with probability p
    pub fn phase_flip(p: f64) -> Result<NoiseChannel, NoiseError> {
        validate_prob(p)?;

        let p_stay = (1.0 - p).sqrt();
        let p_flip = p.sqrt();

        let k0 = array![
            [Complex64::new(p_stay, 0.0), Complex64::new(0.0, 0.0)],
            [Complex64::new(0.0, 0.0), Complex64::new(p_stay, 0.0)]
        ];

        let k1 = array![
            [Complex64::new(p_flip, 0.0), Complex64::new(0.0, 0.0)],
            [Complex64::new(0.0, 0.0), Complex64::new(-p_flip, 0.0)]
        ];

        NoiseChannel::new(vec![k0, k1])
    }

    /// Depolarizing Channel: the qubit is fully randomized with probability p
    pub fn depolarizing(p: f64) -> Result<NoiseChannel, NoiseError> {
        validate_prob(p)?;

        let weight_i = (1.0 - 0.75 * p).sqrt();
        let weight_xyz = (p / 4.0).sqrt();
        let zero = Complex64::new(0.0, 0.0);

        let k0 = array![
            [Complex64::new(weight_i, 0.0), zero],
            [zero, Complex64::new(weight_i, 0.0)]
        ];
        let k1 = array![
            [zero, Complex64::new(weight_xyz, 0.0)],
            [Complex64::new(weight_xyz, 0.0), zero]
        ];
        let k2 = array![
            [zero, Complex64::new(0.0, -weight_xyz)],
            [Complex64::new(0.0, weight_xyz), zero]
        ];
        let k3 = array![
            [Complex64::new(weight_xyz, 0.0), zero],
            [zero, Complex64::new(-weight_xyz, 0.0)]
        ];

        NoiseChannel::new(vec![k0, k1, k2, k3])
    }
}

/// Validate probability parameter
fn validate_prob(p: f64) -> Result<(), NoiseError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(NoiseError::InvalidProbability(p));
    }
    Ok(())
}
