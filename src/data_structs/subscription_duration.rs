use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of purchasable subscription lengths.
#[derive(Debug, PartialEq, Eq)]
#[derive(Deserialize, Serialize)]
#[derive(Clone, Copy)]
pub enum SubscriptionDuration {
    #[serde(rename = "1_month")]
    OneMonth,
    #[serde(rename = "3_months")]
    ThreeMonths,
    #[serde(rename = "6_months")]
    SixMonths,
    #[serde(rename = "9_months")]
    NineMonths,
    #[serde(rename = "12_months")]
    TwelveMonths,
}

impl SubscriptionDuration {

    pub const ALL: [SubscriptionDuration; 5] = [
        SubscriptionDuration::OneMonth,
        SubscriptionDuration::ThreeMonths,
        SubscriptionDuration::SixMonths,
        SubscriptionDuration::NineMonths,
        SubscriptionDuration::TwelveMonths,
    ];

    /// Maps the month count a client sends ("1", "3", ...) to a duration.
    /// Surrounding whitespace is ignored, anything else is rejected.
    pub fn from_selector(selector: &str) -> Option<SubscriptionDuration> {
        match selector.trim() {
            "1" => Some(SubscriptionDuration::OneMonth),
            "3" => Some(SubscriptionDuration::ThreeMonths),
            "6" => Some(SubscriptionDuration::SixMonths),
            "9" => Some(SubscriptionDuration::NineMonths),
            "12" => Some(SubscriptionDuration::TwelveMonths),
            _ => None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionDuration::OneMonth => "1_month",
            SubscriptionDuration::ThreeMonths => "3_months",
            SubscriptionDuration::SixMonths => "6_months",
            SubscriptionDuration::NineMonths => "9_months",
            SubscriptionDuration::TwelveMonths => "12_months",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionDuration::OneMonth => "1 Month",
            SubscriptionDuration::ThreeMonths => "3 Months",
            SubscriptionDuration::SixMonths => "6 Months",
            SubscriptionDuration::NineMonths => "9 Months",
            SubscriptionDuration::TwelveMonths => "12 Months",
        }
    }

    /// Total price in whole currency units. Longer plans carry 5/10/15/20% discounts.
    pub fn price(&self) -> i64 {
        match self {
            SubscriptionDuration::OneMonth => 1800,
            SubscriptionDuration::ThreeMonths => 5130,
            SubscriptionDuration::SixMonths => 9720,
            SubscriptionDuration::NineMonths => 13770,
            SubscriptionDuration::TwelveMonths => 17280,
        }
    }

    /// Price in the gateway's minor unit (paise).
    pub fn amount_in_minor_units(&self) -> i64 {
        self.price() * 100
    }

    pub fn validity_days(&self) -> i64 {
        match self {
            SubscriptionDuration::OneMonth => 30,
            SubscriptionDuration::ThreeMonths => 90,
            SubscriptionDuration::SixMonths => 180,
            SubscriptionDuration::NineMonths => 270,
            SubscriptionDuration::TwelveMonths => 365,
        }
    }

    pub fn end_date_from(&self, start_date: DateTime<Utc>) -> DateTime<Utc> {
        start_date + Duration::days(self.validity_days())
    }
}

impl Display for SubscriptionDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionDuration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionDuration::ALL.into_iter()
            .find(|duration| duration.as_str() == s)
            .ok_or_else(|| DurationParseError {
                message: s.to_owned() + " is not a valid subscription duration!"
            })
    }
}

#[derive(Debug)]
pub struct DurationParseError {
    message: String,
}

impl Display for DurationParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DurationParseError {}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn selectors_map_to_the_pricing_table() {
        let expected = [
            ("1", 1800, 30),
            ("3", 5130, 90),
            ("6", 9720, 180),
            ("9", 13770, 270),
            ("12", 17280, 365),
        ];
        for (selector, price, days) in expected {
            let duration = SubscriptionDuration::from_selector(selector).unwrap();
            assert_eq!(duration.price(), price);
            assert_eq!(duration.validity_days(), days);
            assert_eq!(duration.amount_in_minor_units(), price * 100);
        }
    }

    #[test]
    fn unknown_selectors_are_rejected() {
        for selector in ["", "0", "2", "24", "one", "3_months", "-1", "1.0"] {
            assert_eq!(SubscriptionDuration::from_selector(selector), None, "selector {selector:?}");
        }
    }

    #[test]
    fn selector_whitespace_is_trimmed() {
        assert_eq!(SubscriptionDuration::from_selector(" 12 "), Some(SubscriptionDuration::TwelveMonths));
    }

    #[test]
    fn three_months_ends_exactly_ninety_days_later() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 10, 0, 0).unwrap();
        let end = SubscriptionDuration::ThreeMonths.end_date_from(start);
        assert_eq!(end - start, Duration::days(90));
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 4, 30, 10, 0, 0).unwrap());
    }

    #[test]
    fn codes_parse_back() {
        for duration in SubscriptionDuration::ALL {
            assert_eq!(duration.as_str().parse::<SubscriptionDuration>().unwrap(), duration);
        }
        assert!("2_months".parse::<SubscriptionDuration>().is_err());
    }

    #[test]
    fn serializes_as_the_stored_code() {
        let json = serde_json::to_string(&SubscriptionDuration::SixMonths).unwrap();
        assert_eq!(json, "\"6_months\"");
    }
}
