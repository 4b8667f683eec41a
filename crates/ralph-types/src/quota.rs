use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaStatus {
    Available,
    Limited,
    Exhausted,
    Unavailable,
    Unknown,
}

impl QuotaStatus {
    /// A provider is usable at plan/recommendation time in these two states
    /// (§4.4's "available or limited" rule, repeated throughout §4.5/§4.8).
    pub fn is_usable(self) -> bool {
        matches!(self, QuotaStatus::Available | QuotaStatus::Limited)
    }

    /// Crossing into either of these triggers a `quota-warning` event
    /// (§4.2).
    pub fn is_warning(self) -> bool {
        matches!(self, QuotaStatus::Limited | QuotaStatus::Exhausted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    pub provider: String,
    pub status: QuotaStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub details: String,
}

impl Quota {
    pub fn unknown(provider: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: QuotaStatus::Unknown,
            remaining: None,
            reset_at: None,
            details: details.into(),
        }
    }

    pub fn unavailable(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            status: QuotaStatus::Unavailable,
            remaining: None,
            reset_at: None,
            details: "no credential source found".to_string(),
        }
    }
}
