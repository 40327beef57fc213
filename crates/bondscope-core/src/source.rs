//! Remote API contract and the typed requests a fetch worker issues.
//!
//! The remote API is an opaque blocking RPC: every call returns a
//! [`RequestOutcome`]. Each [`FetchRequest`] binds one [`Method`] (the key
//! used for rate-limit lookup) to a call on a [`RemoteApi`].
//!
//! | Method | Request | Payload |
//! |--------|---------|---------|
//! | `GetBondCoupons` | [`CouponsRequest`] | [`BondCoupons`] |
//! | `GetForecastBy` | [`ForecastRequest`] | [`Forecast`] |
//! | `GetCandles` | [`CandlesRequest`] | [`CandleSeries`] |
//! | `GetAssetBy` | [`AssetRequest`] | [`AssetDetails`] |
//! | `GetDividends` | [`DividendsRequest`] | [`DividendHistory`] |
//! | `GetLastPrices` | [`LastPriceRequest`] | [`LastPrice`] |

use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    AssetDetails, BondCoupons, Candle, CandleInterval, CandleSeries, Coupon, Dividend,
    DividendHistory, FetchError, Forecast, InstrumentUid, LastPrice, Token,
};

/// Remote method a request is accounted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    GetBondCoupons,
    GetForecastBy,
    GetAssetBy,
    GetDividends,
    GetCandles,
    GetLastPrices,
}

impl Method {
    pub const ALL: [Self; 6] = [
        Self::GetBondCoupons,
        Self::GetForecastBy,
        Self::GetAssetBy,
        Self::GetDividends,
        Self::GetCandles,
        Self::GetLastPrices,
    ];

    /// Service-qualified name; rate limits are configured under this key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetBondCoupons => "InstrumentsService/GetBondCoupons",
            Self::GetForecastBy => "InstrumentsService/GetForecastBy",
            Self::GetAssetBy => "InstrumentsService/GetAssetBy",
            Self::GetDividends => "InstrumentsService/GetDividends",
            Self::GetCandles => "MarketDataService/GetCandles",
            Self::GetLastPrices => "MarketDataService/GetLastPrices",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Methods a [`RemoteApi`] implementation serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub bond_coupons: bool,
    pub forecast: bool,
    pub asset: bool,
    pub dividends: bool,
    pub candles: bool,
    pub last_prices: bool,
}

impl CapabilitySet {
    pub const fn full() -> Self {
        Self {
            bond_coupons: true,
            forecast: true,
            asset: true,
            dividends: true,
            candles: true,
            last_prices: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            bond_coupons: false,
            forecast: false,
            asset: false,
            dividends: false,
            candles: false,
            last_prices: false,
        }
    }

    pub fn with(mut self, method: Method) -> Self {
        match method {
            Method::GetBondCoupons => self.bond_coupons = true,
            Method::GetForecastBy => self.forecast = true,
            Method::GetAssetBy => self.asset = true,
            Method::GetDividends => self.dividends = true,
            Method::GetCandles => self.candles = true,
            Method::GetLastPrices => self.last_prices = true,
        }
        self
    }

    pub const fn supports(self, method: Method) -> bool {
        match method {
            Method::GetBondCoupons => self.bond_coupons,
            Method::GetForecastBy => self.forecast,
            Method::GetAssetBy => self.asset,
            Method::GetDividends => self.dividends,
            Method::GetCandles => self.candles,
            Method::GetLastPrices => self.last_prices,
        }
    }

    pub fn supported_methods(self) -> Vec<Method> {
        Method::ALL
            .into_iter()
            .filter(|method| self.supports(*method))
            .collect()
    }
}

/// Result of one remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome<P> {
    Success(P),
    /// The API answered with an error status.
    RequestError { code: String },
    /// The call itself failed (transport, decoding, ...).
    Exception { detail: String },
    /// The call was never sent.
    NotAttempted { reason: String },
}

impl<P> RequestOutcome<P> {
    pub fn request_error(code: impl Into<String>) -> Self {
        Self::RequestError { code: code.into() }
    }

    pub fn exception(detail: impl Into<String>) -> Self {
        Self::Exception {
            detail: detail.into(),
        }
    }

    pub fn unsupported(method: Method) -> Self {
        Self::NotAttempted {
            reason: format!("method '{method}' is not supported by this api"),
        }
    }

    pub fn map<Q>(self, f: impl FnOnce(P) -> Q) -> RequestOutcome<Q> {
        match self {
            Self::Success(payload) => RequestOutcome::Success(f(payload)),
            Self::RequestError { code } => RequestOutcome::RequestError { code },
            Self::Exception { detail } => RequestOutcome::Exception { detail },
            Self::NotAttempted { reason } => RequestOutcome::NotAttempted { reason },
        }
    }

    /// Failure as a per-target [`FetchError`]; `None` for success and skipped calls.
    pub fn failure(&self) -> Option<FetchError> {
        match self {
            Self::RequestError { code } => Some(FetchError::RequestFailed { code: code.clone() }),
            Self::Exception { detail } => Some(FetchError::RequestException {
                detail: detail.clone(),
            }),
            Self::Success(_) | Self::NotAttempted { .. } => None,
        }
    }
}

/// Blocking client of the remote investment API.
///
/// Methods not listed in [`RemoteApi::capabilities`] are never called.
pub trait RemoteApi: Send + Sync {
    fn capabilities(&self) -> CapabilitySet;

    fn bond_coupons(
        &self,
        _token: &Token,
        _uid: InstrumentUid,
        _from: Option<Date>,
        _to: Option<Date>,
    ) -> RequestOutcome<Vec<Coupon>> {
        RequestOutcome::unsupported(Method::GetBondCoupons)
    }

    fn forecast(&self, _token: &Token, _uid: InstrumentUid) -> RequestOutcome<Forecast> {
        RequestOutcome::unsupported(Method::GetForecastBy)
    }

    fn asset(&self, _token: &Token, _asset_uid: InstrumentUid) -> RequestOutcome<AssetDetails> {
        RequestOutcome::unsupported(Method::GetAssetBy)
    }

    fn dividends(
        &self,
        _token: &Token,
        _uid: InstrumentUid,
        _from: Option<Date>,
        _to: Option<Date>,
    ) -> RequestOutcome<Vec<Dividend>> {
        RequestOutcome::unsupported(Method::GetDividends)
    }

    fn candles(
        &self,
        _token: &Token,
        _uid: InstrumentUid,
        _interval: CandleInterval,
        _from: OffsetDateTime,
        _to: OffsetDateTime,
    ) -> RequestOutcome<Vec<Candle>> {
        RequestOutcome::unsupported(Method::GetCandles)
    }

    fn last_price(&self, _token: &Token, _uid: InstrumentUid) -> RequestOutcome<LastPrice> {
        RequestOutcome::unsupported(Method::GetLastPrices)
    }
}

/// One kind of per-target request a fetch worker can issue.
pub trait FetchRequest: Send + Sync + 'static {
    type Target: Clone + Display + Debug + Send + 'static;
    type Payload: Send + 'static;

    fn method(&self) -> Method;

    fn call(&self, token: &Token, target: &Self::Target) -> RequestOutcome<Self::Payload>;
}

fn guarded<P>(
    api: &dyn RemoteApi,
    method: Method,
    call: impl FnOnce() -> RequestOutcome<P>,
) -> RequestOutcome<P> {
    if api.capabilities().supports(method) {
        call()
    } else {
        RequestOutcome::unsupported(method)
    }
}

/// Coupon schedule of each bond, optionally restricted to a date range.
#[derive(Clone)]
pub struct CouponsRequest {
    api: Arc<dyn RemoteApi>,
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl CouponsRequest {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self {
            api,
            from: None,
            to: None,
        }
    }

    pub fn between(mut self, from: Option<Date>, to: Option<Date>) -> Self {
        self.from = from;
        self.to = to;
        self
    }
}

impl FetchRequest for CouponsRequest {
    type Target = InstrumentUid;
    type Payload = BondCoupons;

    fn method(&self) -> Method {
        Method::GetBondCoupons
    }

    fn call(&self, token: &Token, uid: &InstrumentUid) -> RequestOutcome<BondCoupons> {
        let uid = *uid;
        guarded(self.api.as_ref(), self.method(), || {
            self.api
                .bond_coupons(token, uid, self.from, self.to)
                .map(|coupons| BondCoupons { uid, coupons })
        })
    }
}

/// Consensus forecast of each share.
#[derive(Clone)]
pub struct ForecastRequest {
    api: Arc<dyn RemoteApi>,
}

impl ForecastRequest {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self { api }
    }
}

impl FetchRequest for ForecastRequest {
    type Target = InstrumentUid;
    type Payload = Forecast;

    fn method(&self) -> Method {
        Method::GetForecastBy
    }

    fn call(&self, token: &Token, uid: &InstrumentUid) -> RequestOutcome<Forecast> {
        guarded(self.api.as_ref(), self.method(), || self.api.forecast(token, *uid))
    }
}

/// Asset details; targets are asset uids.
#[derive(Clone)]
pub struct AssetRequest {
    api: Arc<dyn RemoteApi>,
}

impl AssetRequest {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self { api }
    }
}

impl FetchRequest for AssetRequest {
    type Target = InstrumentUid;
    type Payload = AssetDetails;

    fn method(&self) -> Method {
        Method::GetAssetBy
    }

    fn call(&self, token: &Token, asset_uid: &InstrumentUid) -> RequestOutcome<AssetDetails> {
        guarded(self.api.as_ref(), self.method(), || self.api.asset(token, *asset_uid))
    }
}

/// Dividend history of each share.
#[derive(Clone)]
pub struct DividendsRequest {
    api: Arc<dyn RemoteApi>,
    pub from: Option<Date>,
    pub to: Option<Date>,
}

impl DividendsRequest {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self {
            api,
            from: None,
            to: None,
        }
    }

    pub fn between(mut self, from: Option<Date>, to: Option<Date>) -> Self {
        self.from = from;
        self.to = to;
        self
    }
}

impl FetchRequest for DividendsRequest {
    type Target = InstrumentUid;
    type Payload = DividendHistory;

    fn method(&self) -> Method {
        Method::GetDividends
    }

    fn call(&self, token: &Token, uid: &InstrumentUid) -> RequestOutcome<DividendHistory> {
        let uid = *uid;
        guarded(self.api.as_ref(), self.method(), || {
            self.api
                .dividends(token, uid, self.from, self.to)
                .map(|dividends| DividendHistory { uid, dividends })
        })
    }
}

/// Candles of one interval over a fixed time range.
#[derive(Clone)]
pub struct CandlesRequest {
    api: Arc<dyn RemoteApi>,
    pub interval: CandleInterval,
    pub from: OffsetDateTime,
    pub to: OffsetDateTime,
}

impl CandlesRequest {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        interval: CandleInterval,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Self {
        Self {
            api,
            interval,
            from,
            to,
        }
    }
}

impl FetchRequest for CandlesRequest {
    type Target = InstrumentUid;
    type Payload = CandleSeries;

    fn method(&self) -> Method {
        Method::GetCandles
    }

    fn call(&self, token: &Token, uid: &InstrumentUid) -> RequestOutcome<CandleSeries> {
        let uid = *uid;
        let interval = self.interval;
        guarded(self.api.as_ref(), self.method(), || {
            self.api
                .candles(token, uid, interval, self.from, self.to)
                .map(|candles| CandleSeries {
                    uid,
                    interval,
                    candles,
                })
        })
    }
}

/// Last trade price of each instrument.
#[derive(Clone)]
pub struct LastPriceRequest {
    api: Arc<dyn RemoteApi>,
}

impl LastPriceRequest {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self { api }
    }
}

impl FetchRequest for LastPriceRequest {
    type Target = InstrumentUid;
    type Payload = LastPrice;

    fn method(&self) -> Method {
        Method::GetLastPrices
    }

    fn call(&self, token: &Token, uid: &InstrumentUid) -> RequestOutcome<LastPrice> {
        guarded(self.api.as_ref(), self.method(), || self.api.last_price(token, *uid))
    }
}
