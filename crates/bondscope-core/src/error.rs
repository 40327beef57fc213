use thiserror::Error;

use crate::domain::Currency;

/// Validation and contract errors exposed by `bondscope-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("currency must be a 3-letter ISO code: '{value}'")]
    InvalidCurrency { value: String },

    #[error("instrument uid must be a UUID: '{value}'")]
    InvalidInstrumentUid { value: String },

    #[error("api token cannot be empty")]
    EmptyToken,

    #[error("method name cannot be empty")]
    EmptyMethodName,
    #[error("rate limit for '{method}' must allow at least one permit per window")]
    ZeroPermits { method: String },
    #[error("rate limit window for '{method}' must be non-zero")]
    ZeroWindow { method: String },

    #[error("coupon #{number} ends ({end}) before it starts ({start})")]
    InvalidCouponPeriod {
        number: u32,
        start: time::Date,
        end: time::Date,
    },
    #[error("coupon #{number} pays in {actual}, bond is denominated in {expected}")]
    CouponCurrency {
        number: u32,
        expected: Currency,
        actual: Currency,
    },

    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("field '{field}' must lie within [0, 1]")]
    NotAFraction { field: &'static str },
}

/// Arithmetic errors for [`Money`](crate::Money).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MoneyError {
    #[error("cannot combine {left} with {right}")]
    CurrencyMismatch { left: Currency, right: Currency },
}

/// Reasons a blocking permit acquisition gave up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcquireError {
    #[error("acquire interrupted")]
    Interrupted,

    #[error("requested {requested} permits but '{method}' only allows {permits} per window")]
    ExceedsWindow {
        method: String,
        requested: u32,
        permits: u32,
    },
}

/// Errors that end a single request or a whole fetch batch.
///
/// Request failures are recorded per target and the batch continues; the other
/// variants end the batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("rate limit not found for method '{method}'")]
    RateLimitUnconfigured { method: String },

    #[error("request failed with code '{code}'")]
    RequestFailed { code: String },

    #[error("request raised: {detail}")]
    RequestException { detail: String },

    #[error("rate limiter refused the request: {detail}")]
    Throttled { detail: String },

    #[error("failed to start fetch worker: {detail}")]
    Spawn { detail: String },

    #[error("fetch was interrupted")]
    Interrupted,
}

impl FetchError {
    /// Whether the error aborts the whole batch rather than a single target.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RateLimitUnconfigured { .. } | Self::Throttled { .. } | Self::Spawn { .. }
        )
    }
}

/// Errors raised while loading token and rate-limit configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no token named '{name}' in config")]
    UnknownToken { name: String },
}

/// A controller event that has no transition from the current state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("event {event:?} is not allowed in state {state:?}")]
pub struct TransitionError {
    pub state: crate::WorkerState,
    pub event: crate::ControllerEvent,
}

/// Errors returned by [`WorkerController`](crate::WorkerController) commands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("a fetch worker is already alive")]
    WorkerAlive,

    #[error("cannot start without a token and at least one target")]
    MissingInputs,

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
