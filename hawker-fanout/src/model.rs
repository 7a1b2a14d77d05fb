//! Domain rows the worker reads and writes. The SQL schema behind them is a
//! deployment concern; these are the shapes the persistence contracts speak.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// A subscriber-owned address. Addresses are polymorphic over their owner in
/// the wider system; the fan-out only ever sees user-profile-owned rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub is_active: bool,
    pub is_primary: bool,
}

/// One qualifying-address candidate row: the address bundled with its
/// subscription's notification radius, so the radius filter needs no second
/// query.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberAddress {
    pub address: Address,
    pub notification_radius_m: f64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            other => Err(format!("unknown platform {other:?}")),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ios => f.write_str("ios"),
            Self::Android => f.write_str("android"),
        }
    }
}

/// An active push target.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: Uuid,
    pub user_id: Uuid,
    pub push_token: String,
    pub platform: Platform,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// One row per `(campaign, device)` delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryLog {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub device_id: Uuid,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// The campaign aggregate written once per attempt that reaches the send
/// loop. A redelivered attempt overwrites the row with its own numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignTotals {
    pub notification_id: Uuid,
    pub total_sent: u32,
    pub total_failed: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!("iOS".parse::<Platform>().unwrap(), Platform::Ios);
        assert_eq!("ANDROID".parse::<Platform>().unwrap(), Platform::Android);
        assert!("windows".parse::<Platform>().is_err());
    }

    #[test]
    fn platform_display_matches_wire_form() {
        assert_eq!(Platform::Ios.to_string(), "ios");
        assert_eq!(Platform::Android.to_string(), "android");
    }
}
