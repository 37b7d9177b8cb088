use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// How the advertised reward rate is expressed. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum YieldKind {
    #[default]
    #[serde(rename = "APR")]
    Apr,
    #[serde(rename = "APY")]
    Apy,
}

impl YieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            YieldKind::Apr => "APR",
            YieldKind::Apy => "APY",
        }
    }
}

impl FromStr for YieldKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "apr" => Ok(YieldKind::Apr),
            "apy" => Ok(YieldKind::Apy),
            _ => Err(ValidationError::UnknownYieldKind(s.trim().to_string())),
        }
    }
}

impl fmt::Display for YieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One staked position as entered by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeRecord {
    pub platform: String,
    pub staked_token: String,
    /// Price API identifier. May be empty, in which case the stake values at 0.
    #[serde(default)]
    pub price_asset_id: String,
    pub staked_quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivative_token: Option<String>,
    #[serde(default)]
    pub fee_paid: f64,
    /// Currency code `fee_paid` is denominated in. Empty means the session currency.
    #[serde(default)]
    pub fee_currency: String,
    pub yield_rate: f64,
    #[serde(default)]
    pub yield_kind: YieldKind,
    #[serde(default)]
    pub lockup_status: String,
    #[serde(default)]
    pub withdrawal_terms: String,
    #[serde(default)]
    pub wallet_label: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl StakeRecord {
    /// Re-applies the admission rules to a record that did not come through
    /// a form, e.g. one read from an import file.
    pub fn check(&self) -> Result<(), ValidationError> {
        if self.platform.trim().is_empty() {
            return Err(ValidationError::PlatformRequired);
        }
        if self.staked_token.trim().is_empty() {
            return Err(ValidationError::TokenRequired);
        }
        if !self.staked_quantity.is_finite() {
            return Err(ValidationError::InvalidQuantity(
                self.staked_quantity.to_string(),
            ));
        }
        if self.staked_quantity <= 0.0 {
            return Err(ValidationError::NonPositiveQuantity(self.staked_quantity));
        }
        if !self.yield_rate.is_finite() {
            return Err(ValidationError::InvalidYield(self.yield_rate.to_string()));
        }
        if self.yield_rate < 0.0 {
            return Err(ValidationError::NegativeYield(self.yield_rate));
        }
        if !self.fee_paid.is_finite() {
            return Err(ValidationError::InvalidFee(self.fee_paid.to_string()));
        }
        if self.fee_paid < 0.0 {
            return Err(ValidationError::NegativeFee(self.fee_paid));
        }
        Ok(())
    }

    /// Key this stake is priced under. Stored ids are normalised again so a
    /// hand-edited or imported id matches what the resolver fetched.
    pub fn price_key(&self) -> String {
        normalize_asset_id(&self.price_asset_id)
    }

    /// Lock-up description with withdrawal terms in parentheses, if any.
    pub fn lockup_display(&self) -> String {
        if self.withdrawal_terms.is_empty() {
            self.lockup_status.clone()
        } else if self.lockup_status.is_empty() {
            format!("({})", self.withdrawal_terms)
        } else {
            format!("{} ({})", self.lockup_status, self.withdrawal_terms)
        }
    }
}

/// Lower-cases an identifier and strips every whitespace character.
pub fn normalize_asset_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

// Accepts a decimal comma; rejects NaN and infinities.
fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Raw form input, one string per editable field of a [`StakeRecord`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StakeForm {
    pub platform: String,
    pub staked_token: String,
    pub price_asset_id: String,
    pub staked_quantity: String,
    pub derivative_token: String,
    pub fee_paid: String,
    pub yield_rate: String,
    pub yield_kind: String,
    pub lockup_status: String,
    pub withdrawal_terms: String,
    pub wallet_label: String,
    pub notes: String,
}

impl StakeForm {
    /// Normalizes the form into a record. Nothing is stored here; the caller
    /// decides what to do with the record or the error.
    pub fn admit(
        &self,
        fee_currency: &str,
        now: DateTime<Utc>,
    ) -> Result<StakeRecord, ValidationError> {
        let platform = self.platform.trim().to_string();
        if platform.is_empty() {
            return Err(ValidationError::PlatformRequired);
        }
        let staked_token = self.staked_token.trim().to_uppercase();
        if staked_token.is_empty() {
            return Err(ValidationError::TokenRequired);
        }

        let quantity = self.staked_quantity.trim();
        if quantity.is_empty() {
            return Err(ValidationError::QuantityRequired);
        }
        let staked_quantity = parse_number(quantity)
            .ok_or_else(|| ValidationError::InvalidQuantity(quantity.to_string()))?;
        if staked_quantity <= 0.0 {
            return Err(ValidationError::NonPositiveQuantity(staked_quantity));
        }

        let rate = self.yield_rate.trim();
        if rate.is_empty() {
            return Err(ValidationError::YieldRequired);
        }
        let yield_rate =
            parse_number(rate).ok_or_else(|| ValidationError::InvalidYield(rate.to_string()))?;
        if yield_rate < 0.0 {
            return Err(ValidationError::NegativeYield(yield_rate));
        }

        let fee = self.fee_paid.trim();
        let fee_paid = if fee.is_empty() {
            0.0
        } else {
            parse_number(fee).ok_or_else(|| ValidationError::InvalidFee(fee.to_string()))?
        };
        if fee_paid < 0.0 {
            return Err(ValidationError::NegativeFee(fee_paid));
        }

        let yield_kind = self.yield_kind.parse::<YieldKind>()?;

        let derivative_token = Some(self.derivative_token.trim().to_uppercase())
            .filter(|t| !t.is_empty());

        Ok(StakeRecord {
            platform,
            staked_token,
            price_asset_id: normalize_asset_id(&self.price_asset_id),
            staked_quantity,
            derivative_token,
            fee_paid,
            fee_currency: fee_currency.trim().to_lowercase(),
            yield_rate,
            yield_kind,
            lockup_status: self.lockup_status.trim().to_string(),
            withdrawal_terms: self.withdrawal_terms.trim().to_string(),
            wallet_label: self.wallet_label.trim().to_string(),
            notes: self.notes.trim().to_string(),
            created_at: now,
        })
    }
}

/// Parses a JSON array of stakes, e.g. an import file.
pub fn from_string(data: &str) -> Result<Vec<StakeRecord>, serde_json::Error> {
    serde_json::from_str::<Vec<StakeRecord>>(data)
}
