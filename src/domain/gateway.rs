use super::money::{Amount, Currency};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    Paid,
    Failed,
    /// The gateway has no record of the reference.
    Unknown,
}

/// The gateway's answer for a reference it was able to judge.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayVerification {
    pub status: GatewayStatus,
    pub amount: Option<Amount>,
    pub currency: Option<Currency>,
    pub raw_response: Value,
}

impl GatewayVerification {
    pub fn paid(amount: Amount, currency: Currency, raw_response: Value) -> Self {
        Self {
            status: GatewayStatus::Paid,
            amount: Some(amount),
            currency: Some(currency),
            raw_response,
        }
    }

    pub fn failed(raw_response: Value) -> Self {
        Self {
            status: GatewayStatus::Failed,
            amount: None,
            currency: None,
            raw_response,
        }
    }

    pub fn unknown(raw_response: Value) -> Self {
        Self {
            status: GatewayStatus::Unknown,
            amount: None,
            currency: None,
            raw_response,
        }
    }

    /// True only when the gateway reports PAID for exactly this amount and currency.
    pub fn confirms(&self, amount: Amount, currency: &Currency) -> bool {
        self.status == GatewayStatus::Paid
            && self.amount == Some(amount)
            && self.currency.as_ref() == Some(currency)
    }
}

/// Result of one verify-by-reference call.
///
/// `Determined` carries a verdict; the other two variants mean no verdict was
/// obtained and the attempt may be repeated later.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome {
    Determined(GatewayVerification),
    /// The gateway knows the reference but has not settled it yet.
    Unsettled { raw_response: Value },
    /// Transport failure, timeout, server error or unreadable reply.
    Unreachable { reason: String },
}
