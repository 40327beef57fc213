//! Accrued income and profitability of a bond held over a date window.
//!
//! All functions are pure. The holding window is `(as_of, eval_date]`: the
//! bond is bought on `as_of` and valued (sold or redeemed) on `eval_date`.
//! Guards such as a zero-day coupon period or a multi-currency bond yield
//! an absent value; overlapping coupon periods are a hard error.

use bondscope_core::{Bond, Coupon, CouponType, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{CouponCase, Remark, TraceLine, Valuation, ValuationConfig, ValuationError};

const DAYS_PER_YEAR: u32 = 365;

/// What is known about the last market price of a bond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "price")]
pub enum LastPriceState {
    /// Prices have not been fetched yet.
    #[default]
    NotLoaded,
    /// Fetched, but the exchange reported no price.
    Missing,
    Known(Money),
}

impl LastPriceState {
    pub fn known(&self) -> Option<Money> {
        match self {
            Self::Known(price) => Some(*price),
            Self::NotLoaded | Self::Missing => None,
        }
    }
}

impl From<Option<Money>> for LastPriceState {
    fn from(price: Option<Money>) -> Self {
        price.map_or(Self::Missing, Self::Known)
    }
}

/// The coupon whose `[start_date, end_date)` contains `date`.
pub fn current_coupon(coupons: &[Coupon], date: Date) -> Result<Option<&Coupon>, ValuationError> {
    let mut matching = coupons.iter().filter(|coupon| coupon.contains(date));
    let Some(first) = matching.next() else {
        return Ok(None);
    };

    match matching.next() {
        Some(second) => Err(ValuationError::AmbiguousCouponPeriod {
            date,
            first: first.number,
            second: second.number,
        }),
        None => Ok(Some(first)),
    }
}

pub fn is_registry_fixed(coupon: &Coupon, date: Date) -> bool {
    date >= coupon.fix_date
}

/// Days of the period accrued by `date`, counting the start date itself.
pub fn days_since_period_start(coupon: &Coupon, date: Date) -> i64 {
    (date - coupon.start_date).whole_days() + 1
}

/// Coupon income accrued on `date`.
///
/// `None` when `date` is outside the period or the period has zero days.
/// With `with_fix`, income is zero once the registry is fixed.
pub fn accrued_coupon_income(coupon: &Coupon, date: Date, with_fix: bool) -> Option<Money> {
    if !coupon.contains(date) {
        return None;
    }
    if with_fix && is_registry_fixed(coupon, date) {
        return Some(Money::zero(coupon.pay_one_bond.currency));
    }
    if coupon.period_days == 0 {
        return None;
    }

    let days = Decimal::from(days_since_period_start(coupon, date));
    (coupon.pay_one_bond * days).checked_div(Decimal::from(coupon.period_days))
}

/// Decides how `coupon` contributes to profit over `(as_of, eval_date]`.
///
/// Only the holder on the record date is entitled to the payment. The
/// payment date separates a coupon already paid inside the window
/// ([`CouponCase::FullPeriod`]) from one owed but paid after `eval_date`
/// ([`CouponCase::HeldThroughFixation`]); both count the full payment.
pub fn classify_coupon(coupon: &Coupon, as_of: Date, eval_date: Date) -> CouponCase {
    let held_at_fixation = !is_registry_fixed(coupon, as_of) && is_registry_fixed(coupon, eval_date);
    let whole_period = as_of < coupon.start_date && coupon.end_date <= eval_date;

    if whole_period && held_at_fixation && coupon.pay_date <= eval_date {
        CouponCase::FullPeriod
    } else if coupon.contains(as_of) && is_registry_fixed(coupon, as_of) {
        CouponCase::FixedBeforePurchase
    } else if held_at_fixation && (whole_period || coupon.contains(as_of) || coupon.contains(eval_date)) {
        CouponCase::HeldThroughFixation
    } else if coupon.contains(eval_date) && !is_registry_fixed(coupon, eval_date) {
        CouponCase::SoldWithAccrued
    } else if coupon.end_date <= as_of && held_at_fixation {
        CouponCase::PaidAfterPeriodEnd
    } else {
        CouponCase::OutsideWindow
    }
}

/// Post-tax coupon income earned over `(as_of, eval_date]`.
pub fn coupon_absolute_profit(
    bond: &Bond,
    coupons: &[Coupon],
    eval_date: Date,
    as_of: Date,
    config: &ValuationConfig,
) -> Result<Option<Money>, ValuationError> {
    Ok(trace_coupon_profit(bond, coupons, eval_date, as_of, config)?.value)
}

/// [`coupon_absolute_profit`] with one trace line per contributing coupon.
pub fn trace_coupon_profit(
    bond: &Bond,
    coupons: &[Coupon],
    eval_date: Date,
    as_of: Date,
    config: &ValuationConfig,
) -> Result<Valuation<Money>, ValuationError> {
    let mut valuation = Valuation::default();
    let mut total = Money::zero(bond.currency);

    for coupon in coupons {
        let case = classify_coupon(coupon, as_of, eval_date);
        let cash = match case {
            CouponCase::FullPeriod | CouponCase::HeldThroughFixation | CouponCase::PaidAfterPeriodEnd => {
                coupon.pay_one_bond
            }
            CouponCase::SoldWithAccrued => match accrued_coupon_income(coupon, eval_date, true) {
                Some(accrued) => accrued,
                None => {
                    return Ok(valuation.fail(Remark::ZeroCouponPeriod {
                        coupon: coupon.number,
                    }))
                }
            },
            CouponCase::FixedBeforePurchase | CouponCase::OutsideWindow => continue,
        };

        let amount = cash * config.net_share();
        total = total.try_add(amount)?;
        valuation.push(TraceLine::Coupon {
            number: coupon.number,
            case,
            amount,
        });
    }

    Ok(valuation.with_value(total))
}

/// Profit per bond of buying on `as_of` and holding until `eval_date`.
///
/// Coupon income minus the accrued income paid at purchase, plus redemption
/// less the purchase cost when the bond matures by `eval_date`, otherwise
/// less the commission.
pub fn absolute_profit(
    bond: &Bond,
    coupons: &[Coupon],
    price: &LastPriceState,
    eval_date: Date,
    as_of: Date,
    config: &ValuationConfig,
) -> Result<Valuation<Money>, ValuationError> {
    if bond.is_multicurrency() {
        return Ok(Valuation::unavailable(Remark::UnsupportedMulticurrency));
    }

    let coupon_part = trace_coupon_profit(bond, coupons, eval_date, as_of, config)?;
    let Some(coupon_income) = coupon_part.value else {
        return Ok(coupon_part);
    };
    let mut valuation = coupon_part.rebind(None);

    let mut total = coupon_income.try_sub(bond.aci_value)?;
    valuation.push(TraceLine::AccruedPaid {
        amount: -bond.aci_value,
    });

    if bond.matures_by(eval_date) {
        let price = match price.known() {
            Some(price) => price,
            None => {
                valuation.push(TraceLine::Remark(Remark::NominalAsPrice));
                bond.nominal
            }
        };
        let purchase = price * (Decimal::ONE + config.commission);
        total = total.try_add(bond.nominal)?.try_sub(purchase)?;
        valuation.push(TraceLine::Redemption {
            amount: bond.nominal,
        });
        valuation.push(TraceLine::Purchase { amount: -purchase });
    } else {
        let traded = match price {
            LastPriceState::Known(price) => *price,
            LastPriceState::NotLoaded => bond.nominal,
            LastPriceState::Missing => return Ok(valuation.fail(Remark::PriceMissing)),
        };
        let commission = traded * config.commission;
        total = total.try_sub(commission)?;
        valuation.push(TraceLine::Commission {
            amount: -commission,
        });
    }

    Ok(valuation.with_value(total))
}

/// [`absolute_profit`] divided by the last price.
pub fn relative_profit(
    bond: &Bond,
    coupons: &[Coupon],
    price: &LastPriceState,
    eval_date: Date,
    as_of: Date,
    config: &ValuationConfig,
) -> Result<Valuation<Decimal>, ValuationError> {
    let absolute = absolute_profit(bond, coupons, price, eval_date, as_of, config)?;
    let Some(profit) = absolute.value else {
        return Ok(absolute.rebind(None));
    };

    let Some(price) = price.known() else {
        return Ok(absolute.rebind(None).fail(Remark::PriceMissing));
    };
    match profit.ratio(price)? {
        Some(ratio) => Ok(absolute.rebind(Some(ratio))),
        None => Ok(absolute.rebind(None).fail(Remark::ZeroPrice)),
    }
}

/// Annualized coupon yield on the nominal.
///
/// Uses the coupon current on `as_of`, or the earliest one still to come.
/// Only defined when every coupon is [`CouponType::Constant`] and pays in
/// the nominal's currency.
pub fn annual_relative_profit(
    coupons: &[Coupon],
    nominal: Money,
    as_of: Date,
) -> Result<Option<Decimal>, ValuationError> {
    let eligible = !coupons.is_empty()
        && coupons.iter().all(|coupon| {
            coupon.coupon_type == CouponType::Constant && coupon.pay_one_bond.same_currency(&nominal)
        });
    if !eligible {
        return Ok(None);
    }

    let coupon = match current_coupon(coupons, as_of)? {
        Some(coupon) => coupon,
        None => match coupons
            .iter()
            .filter(|coupon| coupon.start_date > as_of)
            .min_by_key(|coupon| coupon.start_date)
        {
            Some(coupon) => coupon,
            None => return Ok(None),
        },
    };

    let denominator = nominal.amount * Decimal::from(coupon.period_days);
    Ok((coupon.pay_one_bond.amount * Decimal::from(DAYS_PER_YEAR)).checked_div(denominator))
}
