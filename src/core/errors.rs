use num_complex::Complex64;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum GateError {
    #[error("Matrix is not Unitary (U†U != I)")]
    NonUnitary,

    #[error("Matrix must be square")]
    NotSquareMatrix,

    #[error("Invalid Dimensions")]
    InvalidDimensions,

    #[error("Qubit {0} cannot be both control and target")]
    ControlTargetOverlap(usize),

    #[error("Duplicate qubit index found: {0}")]
    DuplicateQubit(usize),
}

#[derive(Error, Debug, Clone)]
pub enum MeasurementError {
    #[error("Number of operators ({ops}) does not match number of values ({vals})")]
    CountMismatch { ops: usize, vals: usize },

    #[error("Measurement operators do not sum to Identity (Completeness relation failed)")]
    NotComplete,

    #[error("Invalid operator dimensions")]
    InvalidDimensions,

    #[error("Duplicate qubit index found: {0}")]
    DuplicateQubit(usize),
}

#[derive(Error, Debug, Clone)]
pub enum StateError {
    #[error("Trace is not unity: {0}")]
    InvalidTrace(Complex64),

    #[error("Invalid dimensions")]
    InvalidDimensions,

    #[error("Dimension mismatch")]
    DimensionMismatch {
        expected: usize,
        got_rows: usize,
        got_cols: usize,
    },

    #[error("Qubit index out of bounds")]
    IndexOutOfBounds { index: usize, num_qubits: usize },

    #[error("Measurement error: {0}")]
    MeasurementError(#[from] MeasurementError),

    #[error("Gate error: {0}")]
    GateError(#[from] GateError),

    #[error("Noise error: {0}")]
    NoiseError(#[from] NoiseError),
}

#[derive(Error, Debug, Clone)]
pub enum NoiseError {
    #[error("Noise channel must have at least one Kraus operator")]
    Empty,

    #[error("Kraus operators do not sum to Identity (Trace preserving relation failed)")]
    NotComplete,

    #[error("Invalid operator dimensions: Matrices must be square and 2^n")]
    InvalidDimensions,

    #[error("Dimension mismatch: All Kraus operators must have the same size")]
    OperatorSizeMismatch,

    #[error("Invalid probability: {0}. Must be between 0.0 and 1.0")]
    InvalidProbability(f64),

    #[error("Duplicate qubit index found: {0}")]
    DuplicateQubit(usize),
}

/// Failures reported by the quantum and classical channel collaborators.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Peer disconnected")]
    Disconnected,

    #[error("Channel is closed")]
    Closed,

    #[error("Unexpected frame: expected {expected}, got {got}")]
    UnexpectedFrame {
        expected: &'static str,
        got: &'static str,
    },

    #[error("No calibration transform for basis {0}")]
    UnknownBasis(u8),

    #[error("Simulation failed: {0}")]
    Simulation(#[from] StateError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Error tolerance {0} must be between 0.0 and 1.0")]
    InvalidTolerance(f64),

    #[error("State batch size must be at least 1")]
    EmptyBatch,
}

/// Errors of the key distribution engine and the messaging layer.
///
/// A failed statistical test is not an error: it surfaces as `should_abort`
/// returning `true` and `try_generate_key` returning an empty key.
#[derive(Error, Debug)]
pub enum QkdError {
    #[error("The requested key ({requested}) is too long for the raw key ({available})")]
    ExtractionSize { requested: usize, available: usize },

    #[error("Seed of length {available} is too short, extraction needs {required} bits")]
    SeedLength { required: usize, available: usize },

    #[error("Not enough key ({key}) to decode message of length {message}")]
    InsufficientKeyMaterial { key: usize, message: usize },

    #[error("Malformed tag: {0}")]
    MalformedTag(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
