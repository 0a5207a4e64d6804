// src/domain/changes.rs

use crate::domain::vehicle::VehicleStatus;
use chrono::NaiveDateTime;
use serde::Serialize;

/// Computed delta between two observed prices (minor units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceDelta {
    pub previous: i64,
    pub new: i64,
    pub amount: i64,
    pub percent: f64,
}

impl PriceDelta {
    pub fn is_drop(&self) -> bool {
        self.amount < 0
    }
}

/// A price change is detected iff both the previous and new price are known
/// and differ. A first observation has no previous price and is a baseline,
/// never a change.
pub fn detect_price_change(previous: Option<i64>, new: Option<i64>) -> Option<PriceDelta> {
    let previous = previous?;
    let new = new?;
    if previous == new {
        return None;
    }
    let amount = new - previous;
    Some(PriceDelta {
        previous,
        new,
        amount,
        percent: amount as f64 / previous as f64 * 100.0,
    })
}

/// A status change is detected iff the case-normalized statuses differ.
pub fn detect_status_change(
    previous: VehicleStatus,
    new: VehicleStatus,
) -> Option<(VehicleStatus, VehicleStatus)> {
    if previous == new {
        None
    } else {
        Some((previous, new))
    }
}

/// Immutable record of one detected price transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceChangeRecord {
    pub id: i64,
    pub vehicle_id: i64,
    pub previous_price: i64,
    pub new_price: i64,
    pub change_amount: i64,
    pub change_percent: f64,
    pub triggered_by_user_id: Option<i64>,
    pub detected_at: NaiveDateTime,
}

impl PriceChangeRecord {
    pub fn delta(&self) -> PriceDelta {
        PriceDelta {
            previous: self.previous_price,
            new: self.new_price,
            amount: self.change_amount,
            percent: self.change_percent,
        }
    }
}

/// Immutable record of one detected status transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRecord {
    pub id: i64,
    pub vehicle_id: i64,
    pub previous_status: VehicleStatus,
    pub new_status: VehicleStatus,
    pub triggered_by_user_id: Option<i64>,
    pub detected_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_drop_produces_negative_delta_and_percent() {
        let delta = detect_price_change(Some(2_000_000), Some(1_800_000)).unwrap();
        assert_eq!(delta.amount, -200_000);
        assert_eq!(delta.percent, -10.0);
        assert!(delta.is_drop());
    }

    #[test]
    fn equal_prices_are_not_a_change() {
        assert!(detect_price_change(Some(1_500_000), Some(1_500_000)).is_none());
    }

    #[test]
    fn missing_either_price_is_not_a_change() {
        assert!(detect_price_change(None, Some(1_500_000)).is_none());
        assert!(detect_price_change(Some(1_500_000), None).is_none());
    }

    #[test]
    fn status_change_requires_inequality() {
        assert!(detect_status_change(VehicleStatus::Active, VehicleStatus::Active).is_none());
        let (prev, new) =
            detect_status_change(VehicleStatus::Active, VehicleStatus::Sold).unwrap();
        assert_eq!(prev, VehicleStatus::Active);
        assert_eq!(new, VehicleStatus::Sold);
    }
}
