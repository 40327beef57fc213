//! # Bondscope Core
//!
//! Rate-limited background fetching of per-instrument market data and the
//! domain types shared with the valuation engine.
//!
//! ## Overview
//!
//! - **Domain models** for money, bonds, coupons and fetch payloads
//! - **Per-token rate limiting** with delayed permit re-availability
//! - **Fetch workers** that are pausable, resumable and cancellable
//! - **An explicit controller state machine** owning at most one worker
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`control`] | Interruption flag and pause barrier |
//! | [`controller`] | Worker lifecycle state machine |
//! | [`domain`] | Domain models (Money, Bond, Coupon, payloads) |
//! | [`error`] | Core error types |
//! | [`retry`] | Retry policy and backoff |
//! | [`source`] | Remote API methods, capabilities and requests |
//! | [`throttling`] | Sliding-window rate limiting |
//! | [`token`] | Tokens, quota tables and sessions |
//! | [`worker`] | Background fetch worker and its handle |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bondscope_core::{fetch, CouponsRequest, FetchCallbacks, RetryPolicy, StaticTokenStore};
//!
//! let store = StaticTokenStore::from_path("tokens.json")?;
//! let session = store.session("main")?;
//! let mut handle = fetch(
//!     &session,
//!     Arc::new(CouponsRequest::new(api)),
//!     bond_uids,
//!     RetryPolicy::default(),
//!     FetchCallbacks::new().on_result(|coupons| sink.accept(coupons)),
//! )?;
//!
//! // On the controlling thread:
//! while handle.pump().is_none() {
//!     std::thread::sleep(Duration::from_millis(50));
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  commands   ┌──────────────────┐
//! │ WorkerController │────────────▶│   FetchHandle    │
//! └────────▲─────────┘             └────────┬─────────┘
//!          │ poll()                         │ spawn
//!          │                                ▼
//! ┌────────┴─────────┐   events    ┌──────────────────┐     ┌─────────────┐
//! │   mpsc channel   │◀────────────│   FetchWorker    │────▶│ RateLimiter │
//! └──────────────────┘             └────────┬─────────┘     └─────────────┘
//!                                           ▼
//!                                  ┌──────────────────┐
//!                                  │    RemoteApi     │
//!                                  └──────────────────┘
//! ```

pub mod control;
pub mod controller;
pub mod domain;
pub mod error;
pub mod retry;
pub mod source;
pub mod throttling;
pub mod token;
pub mod worker;

pub use control::WorkerControl;
pub use controller::{
    transition, ControllerEvent, Controls, StartLabel, WorkerController, WorkerState,
};
pub use domain::*;
pub use error::{
    AcquireError, ConfigError, ControllerError, FetchError, MoneyError, TransitionError,
    ValidationError,
};
pub use retry::{Backoff, RetryPolicy};
pub use source::{
    AssetRequest, CandlesRequest, CapabilitySet, CouponsRequest, DividendsRequest, FetchRequest,
    ForecastRequest, LastPriceRequest, Method, RemoteApi, RequestOutcome,
};
pub use throttling::{MethodLimiter, RateLimit, RateLimiter};
pub use token::{default_rate_limits, StaticTokenStore, Token, TokenSession, TokenStore};
pub use worker::{
    fetch, FetchCallbacks, FetchHandle, FetchWorker, Progress, WorkerEvent, WorkerExit,
};
