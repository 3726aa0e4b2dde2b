use thiserror::Error;

/// Main error type for a Calibra tuning run
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Parameter space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Baseline estimation failed: {message}")]
    Baseline { message: String },

    #[error("Insufficient data for configuration {config}: {valid} valid measurements, {required} required")]
    InsufficientData {
        config: String,
        valid: usize,
        required: usize,
    },

    #[error("Measurement failed: {message}")]
    Measurement { message: String },

    #[error("Invalid tuning options: {message}")]
    InvalidOptions { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Parameter-space and configuration validation errors
#[derive(Error, Debug)]
pub enum SpaceError {
    #[error("Unknown parameter: {name}")]
    UnknownParameter { name: String },

    #[error("Duplicate parameter: {name}")]
    DuplicateParameter { name: String },

    #[error("Parameter {name} has an empty domain")]
    EmptyDomain { name: String },

    #[error("Default value of parameter {name} lies outside its domain")]
    DefaultOutOfDomain { name: String },

    #[error("Value {value} of parameter {name} lies outside its domain")]
    OutOfDomain { name: String, value: String },

    #[error("Parameter {name} requires {dependency}={value} to take a non-default value")]
    DependencyViolated {
        name: String,
        dependency: String,
        value: String,
    },

    #[error("Parameter {name} is fixed and cannot be overridden")]
    FixedParameterOverride { name: String },
}

/// Result type alias for Calibra operations
pub type TuneResult<T> = Result<T, TuneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TuneError::InsufficientData {
            config: "{\"x\":1}".to_string(),
            valid: 3,
            required: 5,
        };
        assert!(error.to_string().contains("3 valid measurements"));
        assert!(error.to_string().contains("5 required"));
    }

    #[test]
    fn test_space_error_conversion() {
        let space_error = SpaceError::UnknownParameter {
            name: "bogus".to_string(),
        };
        let tune_error: TuneError = space_error.into();
        match tune_error {
            TuneError::Space(_) => (),
            other => panic!("Expected Space error, got {other:?}"),
        }
    }
}
