//! # Bondscope Valuation
//!
//! Accrued coupon income and profitability of bonds, recomputed whenever a
//! fresh coupon schedule arrives from the fetch pipeline.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Tax and commission rates |
//! | [`engine`] | Pure valuation functions |
//! | [`entity`] | Live bond entity, observers and the coupon sink |
//! | [`error`] | Valuation error types |
//! | [`trace`] | Structured explanation of each result |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bondscope_valuation::{BondEntity, CouponSink, ValuationConfig};
//!
//! let entity = Arc::new(BondEntity::new(bond, ValuationConfig::default()));
//! entity.subscribe(|event| refresh_row(event.uid));
//!
//! let mut sink = CouponSink::new();
//! sink.register(Arc::clone(&entity));
//! sink.accept(fetched_coupons)?;
//!
//! let profit = entity.absolute_profit(maturity)?;
//! for line in profit.explain() {
//!     println!("{line}");
//! }
//! ```

pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod trace;

pub use config::ValuationConfig;
pub use engine::{
    absolute_profit, accrued_coupon_income, annual_relative_profit, classify_coupon,
    coupon_absolute_profit, current_coupon, days_since_period_start, is_registry_fixed,
    relative_profit, trace_coupon_profit, LastPriceState,
};
pub use entity::{BondEntity, CouponSink, CouponsReplaced};
pub use error::ValuationError;
pub use trace::{CouponCase, Remark, TraceLine, Valuation};
