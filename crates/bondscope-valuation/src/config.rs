//! Tax and commission parameters.

use std::path::Path;

use bondscope_core::{ConfigError, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rates applied by the profit calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    /// Flat withholding tax on coupon cash flows.
    pub tax_rate: Decimal,
    /// Broker commission charged on each trade, as a fraction of its value.
    pub commission: Decimal,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(13, 2),
            commission: Decimal::new(3, 3),
        }
    }
}

impl ValuationConfig {
    pub fn new(tax_rate: Decimal, commission: Decimal) -> Result<Self, ValidationError> {
        let config = Self {
            tax_rate,
            commission,
        };
        config.validate()?;
        Ok(config)
    }

    /// No tax and no commission.
    pub fn untaxed() -> Self {
        Self {
            tax_rate: Decimal::ZERO,
            commission: Decimal::ZERO,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tax_rate.is_sign_negative() || self.tax_rate > Decimal::ONE {
            return Err(ValidationError::NotAFraction { field: "tax_rate" });
        }
        if self.commission.is_sign_negative() {
            return Err(ValidationError::NegativeValue { field: "commission" });
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Share of a coupon payment kept after tax.
    pub fn net_share(&self) -> Decimal {
        Decimal::ONE - self.tax_rate
    }
}
