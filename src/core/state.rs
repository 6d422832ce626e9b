use crate::core::errors::{MeasurementError, NoiseError, StateError};
use crate::core::measurements::{Measurement, MeasurementResult};
use crate::core::noise::NoiseChannel;
use crate::core::utils::{find_duplicate, trace};
use crate::core::Gate;
use ndarray::Array2;
use num_complex::Complex64;
use rand::Rng;

#[derive(Clone, Debug)]
pub struct QuantumState {
    pub density_matrix: Array2<Complex64>,
    pub num_qubits: usize,
}

impl QuantumState {
    /// Creates a new quantum state initialized to |0...0>.
    pub fn new(num_qubits: usize) -> Self {
        let dim = 1 << num_qubits;
        let mut density_matrix = Array2::<Complex64>::zeros((dim, dim));
        density_matrix[[0, 0]] = Complex64::new(1.0, 0.0);

        Self {
            density_matrix,
            num_qubits,
        }
    }

    /// Creates the Bell pair |Φ+> = (|00> + |11>) / √2.
    pub fn epr_pair() -> Result<Self, StateError> {
        let mut state = Self::new(2);
        state.apply(&Gate::h(), &[0])?;
        state.apply(&Gate::cnot(), &[0, 1])?;
        Ok(state)
    }

    /// Checks that the density matrix has unit trace.
    pub fn is_valid(&self) -> Result<(), StateError> {
        let tr = trace(&self.density_matrix);
        if (tr - Complex64::new(1.0, 0.0)).norm() > 1e-9 {
            return Err(StateError::InvalidTrace(tr));
        }
        Ok(())
    }

    /// Apply an operator already expanded to the whole system
    fn apply_operator(&mut self, u: &Array2<Complex64>) -> Result<(), StateError> {
        let (rows, cols) = u.dim();
        let dim = 1 << self.num_qubits;

        if rows != dim || cols != dim {
            return Err(StateError::DimensionMismatch {
                expected: dim,
                got_rows: rows,
                got_cols: cols,
            });
        }

        let u_dagger = u.t().mapv(|x| x.conj());
        self.density_matrix = u.dot(&self.density_matrix).dot(&u_dagger);

        Ok(())
    }

    fn validate_qubit_index(&self, index: usize) -> Result<(), StateError> {
        if index >= self.num_qubits {
            return Err(StateError::IndexOutOfBounds {
                index,
                num_qubits: self.num_qubits,
            });
        }
        Ok(())
    }

    /// Applies a quantum gate to `target_qubits`.
    pub fn apply(&mut self, gate: &Gate, target_qubits: &[usize]) -> Result<(), StateError> {
        if gate.num_qubits != target_qubits.len() {
            return Err(StateError::DimensionMismatch {
                expected: gate.num_qubits,
                got_rows: target_qubits.len(),
                got_cols: 0,
            });
        }

        for &q in target_qubits {
            self.validate_qubit_index(q)?;
        }

        let full_gate = Gate::expand_gate(self.num_qubits, gate, target_qubits, &[])?;
        self.apply_operator(&full_gate.matrix)
    }

    /// Returns the probability of each outcome with its operator expanded to the whole system
    fn outcome_probabilities(
        &self,
        measurement: &Measurement,
        target_qubits: &[usize],
    ) -> Result<(Vec<f64>, Vec<Array2<Complex64>>), StateError> {
        for &q in target_qubits {
            self.validate_qubit_index(q)?;
        }

        if let Some(dup) = find_duplicate(target_qubits) {
            return Err(MeasurementError::DuplicateQubit(dup).into());
        }

        let expanded_ops = measurement.get_expanded_operators(self.num_qubits, target_qubits)?;

        let mut probs: Vec<f64> = expanded_ops
            .iter()
            .map(|op| {
                let op_dagger = op.t().mapv(|c| c.conj());
                trace(&op.dot(&self.density_matrix).dot(&op_dagger)).re.max(0.0)
            })
            .collect();

        // Renormalize against floating point drift
        let sum_probs: f64 = probs.iter().sum();
        for p in &mut probs {
            *p /= sum_probs;
        }

        Ok((probs, expanded_ops))
    }

    /// Physical measurement which collapses the state.
    ///
    /// Outcomes are drawn from `rng`, so a seeded generator reproduces a run.
    pub fn measure<R: Rng + ?Sized>(
        &mut self,
        measurement: &Measurement,
        target_qubits: &[usize],
        rng: &mut R,
    ) -> Result<MeasurementResult, StateError> {
        let (probs, ops) = self.outcome_probabilities(measurement, target_qubits)?;

        let roll: f64 = rng.random();
        let mut cumulative = 0.0;
        let outcome_idx = probs
            .iter()
            .position(|&p| {
                cumulative += p;
                roll < cumulative
            })
            .unwrap_or(probs.len().saturating_sub(1));

        let p_selected = probs[outcome_idx];
        if p_selected <= 1e-12 {
            return Err(StateError::InvalidTrace(Complex64::new(0.0, 0.0)));
        }

        // rho' = (M_k * rho * M_k†) / p_k
        let m_k = &ops[outcome_idx];
        let m_k_dagger = m_k.t().mapv(|c| c.conj());
        let numerator = m_k.dot(&self.density_matrix).dot(&m_k_dagger);
        self.density_matrix = numerator.mapv(|val| val / p_selected);

        Ok(MeasurementResult {
            index: outcome_idx,
            value: measurement.values[outcome_idx],
        })
    }

    /// Apply a noise channel to `target_qubits`
    pub fn apply_noise(
        &mut self,
        noise: &NoiseChannel,
        target_qubits: &[usize],
    ) -> Result<(), StateError> {
        if let Some(dup) = find_duplicate(target_qubits) {
            return Err(NoiseError::DuplicateQubit(dup).into());
        }

        let ops = noise.get_expanded_operators(self.num_qubits, target_qubits)?;

        let dim = self.density_matrix.nrows();
        self.density_matrix = ops.iter().fold(
            Array2::<Complex64>::zeros((dim, dim)),
            |acc, k| {
                let k_dagger = k.t().mapv(|c| c.conj());
                acc + k.dot(&self.density_matrix).dot(&k_dagger)
            },
        );

        Ok(())
    }
}
