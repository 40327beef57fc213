//! # Domain Models
//!
//! Strongly typed values exchanged between the fetch pipeline, the valuation
//! engine and the surrounding viewer.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Currency`] | Validated ISO currency code |
//! | [`Money`] | Fixed-point amount in one currency |
//! | [`InstrumentUid`] | Remote instrument/asset identifier |
//! | [`Bond`] | Bond attributes used for valuation |
//! | [`Coupon`] | One coupon period |
//! | [`CouponSchedule`] | Coupons ordered by end date |
//! | [`BondCoupons`], [`Forecast`], [`CandleSeries`], [`AssetDetails`], [`DividendHistory`], [`LastPrice`] | Fetch payloads |

mod bond;
mod instrument;
mod market;
mod money;

pub use bond::{Bond, Coupon, CouponSchedule, CouponType, ScheduleAnomaly};
pub use instrument::InstrumentUid;
pub use market::{
    AssetDetails, BondCoupons, Candle, CandleInterval, CandleSeries, Dividend, DividendHistory,
    Forecast, ForecastTarget, LastPrice, Recommendation,
};
pub use money::{Currency, Money};
