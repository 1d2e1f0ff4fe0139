//! Unified error handling for the elevation-estimator library.
//!
//! This module provides a consistent error type for all estimator operations,
//! replacing mixed error handling patterns (Option, panic, silent failures).

use std::fmt;

/// Unified error type for elevation-estimator operations.
#[derive(Debug, Clone)]
pub enum ElevationError {
    /// Trace has too few altitude samples for estimation
    InsufficientData {
        point_count: usize,
        minimum_required: usize,
    },
    /// Estimator configuration is structurally invalid
    InvalidConfig { message: String },
    /// No calibration case carried a usable reference value
    ReferenceUnavailable { case_count: usize },
    /// Altitude trace could not be loaded from its source
    TraceUnavailable { source_id: String, message: String },
    /// HTTP/API error
    HttpError {
        message: String,
        status_code: Option<u16>,
    },
    /// Persistence/storage error
    PersistenceError { message: String },
}

impl fmt::Display for ElevationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElevationError::InsufficientData {
                point_count,
                minimum_required,
            } => {
                write!(
                    f,
                    "Trace has {} samples, minimum {} required",
                    point_count, minimum_required
                )
            }
            ElevationError::InvalidConfig { message } => {
                write!(f, "Invalid estimator configuration: {}", message)
            }
            ElevationError::ReferenceUnavailable { case_count } => {
                write!(
                    f,
                    "None of the {} calibration cases has a usable reference value",
                    case_count
                )
            }
            ElevationError::TraceUnavailable { source_id, message } => {
                write!(f, "Trace '{}' unavailable: {}", source_id, message)
            }
            ElevationError::HttpError {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "HTTP error ({}): {}", code, message)
                } else {
                    write!(f, "HTTP error: {}", message)
                }
            }
            ElevationError::PersistenceError { message } => {
                write!(f, "Persistence error: {}", message)
            }
        }
    }
}

impl std::error::Error for ElevationError {}

/// Result type alias for elevation-estimator operations.
pub type Result<T> = std::result::Result<T, ElevationError>;
