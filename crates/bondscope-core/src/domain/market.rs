use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{Coupon, InstrumentUid, Money};

/// Coupons returned for one bond by a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondCoupons {
    pub uid: InstrumentUid,
    pub coupons: Vec<Coupon>,
}

/// Analyst recommendation in a consensus forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Unspecified,
    Buy,
    Hold,
    Sell,
}

/// Consensus forecast for an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forecast {
    pub uid: InstrumentUid,
    pub recommendation: Recommendation,
    pub current_price: Option<Money>,
    pub consensus_price: Option<Money>,
    pub min_target: Option<Money>,
    pub max_target: Option<Money>,
    pub targets: Vec<ForecastTarget>,
}

/// A single analyst target inside a [`Forecast`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastTarget {
    pub company: String,
    pub recommendation: Recommendation,
    pub target_price: Money,
    #[serde(with = "time::serde::rfc3339")]
    pub recommendation_date: OffsetDateTime,
}

/// Candle width requested from the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleInterval {
    OneMinute,
    FiveMinutes,
    Hour,
    Day,
    Week,
    Month,
}

impl CandleInterval {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::Hour => "1h",
            Self::Day => "1d",
            Self::Week => "1w",
            Self::Month => "1mo",
        }
    }
}

impl Display for CandleInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OHLCV candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub open: Money,
    pub high: Money,
    pub low: Money,
    pub close: Money,
    pub volume: u64,
    pub is_complete: bool,
}

/// Candles for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleSeries {
    pub uid: InstrumentUid,
    pub interval: CandleInterval,
    pub candles: Vec<Candle>,
}

/// Asset-level details shared by the instruments of one issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDetails {
    pub asset_uid: InstrumentUid,
    pub name: String,
    pub asset_type: String,
    pub brand: Option<String>,
    pub instrument_uids: Vec<InstrumentUid>,
}

/// A declared or paid dividend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dividend {
    pub dividend_net: Money,
    pub record_date: Date,
    pub payment_date: Option<Date>,
    pub last_buy_date: Option<Date>,
}

/// Dividends for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendHistory {
    pub uid: InstrumentUid,
    pub dividends: Vec<Dividend>,
}

/// Most recent trade price of an instrument. `price` is `None` when the
/// instrument has no trades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPrice {
    pub uid: InstrumentUid,
    pub price: Option<Money>,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}
