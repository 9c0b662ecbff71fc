//! Error types for the availability controllers

use std::time::Duration;

use thiserror::Error;

use crate::client::Operation;
use crate::client::breaker::BreakerState;

/// Error variants are named with the `Error` suffix where they wrap another error
/// (e.g., `KubeError`, `SerializationError`).
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Circuit breaker for {operation} is {state}")]
    CircuitOpen {
        operation: Operation,
        state: BreakerState,
    },

    #[error("{operation} call timed out after {after:?}")]
    Timeout { operation: Operation, after: Duration },
}

impl Error {
    fn api_error(&self) -> Option<&kube::error::ErrorResponse> {
        match self {
            Error::KubeError(kube::Error::Api(response)) => Some(response),
            _ => None,
        }
    }

    /// HTTP 404 from the API server
    pub fn is_not_found(&self) -> bool {
        self.api_error().is_some_and(|e| e.code == 404)
    }

    /// Optimistic-concurrency failure ("the object has been modified")
    pub fn is_conflict(&self) -> bool {
        self.api_error()
            .is_some_and(|e| e.code == 409 && e.reason != "AlreadyExists")
    }

    pub fn is_already_exists(&self) -> bool {
        self.api_error()
            .is_some_and(|e| e.code == 409 && e.reason == "AlreadyExists")
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return code == 409 || code == 429;
                    }
                    true
                }
                // Network and other errors are retryable
                _ => true,
            },
            // The breaker half-opens after its timeout
            Error::CircuitOpen { .. } => true,
            Error::Timeout { .. } => true,
            Error::InvalidConfig(_) => false,
            Error::SerializationError(_) => false,
            Error::MissingObjectKey(_) => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let base_delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        Duration::from_secs_f64(delay_with_jitter.min(self.max_delay.as_secs_f64()))
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Wait for manual intervention or an object change
            self.max_delay
        }
    }
}

/// Error tracking for one reconciled object
#[derive(Clone, Debug, Default)]
pub struct ErrorContext {
    /// Number of consecutive errors
    pub consecutive_errors: u32,
    /// Last error message
    pub last_error: Option<String>,
}

impl ErrorContext {
    pub fn record_error(&mut self, error: &Error) {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.last_error = Some(error.to_string());
    }

    pub fn reset(&mut self) {
        self.consecutive_errors = 0;
        self.last_error = None;
    }
}
