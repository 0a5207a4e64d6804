// src/domain/watchlist.rs

use crate::domain::changes::PriceDelta;
use crate::domain::vehicle::VehicleStatus;
use chrono::NaiveDateTime;
use serde::Serialize;

/// A user's subscription to one vehicle, with per-entry notification
/// preferences. One entry per (user, vehicle).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistEntry {
    pub id: i64,
    pub user_id: i64,
    pub vehicle_id: i64,
    pub price_when_added: Option<i64>,
    pub notify_price_drop: bool,
    pub notify_price_rise: bool,
    pub notify_status_change: bool,
    pub notify_relist: bool,
    /// Absolute minimum drop (minor units) before a price notification fires.
    pub price_drop_threshold: Option<i64>,
    pub target_price: Option<i64>,
    pub last_notified_at: Option<NaiveDateTime>,
    pub added_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    PriceDrop,
    PriceRise,
    TargetPriceHit,
    StatusChange,
    RelistDetected,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::PriceDrop => "PRICE_DROP",
            NotificationType::PriceRise => "PRICE_RISE",
            NotificationType::TargetPriceHit => "TARGET_PRICE_HIT",
            NotificationType::StatusChange => "STATUS_CHANGE",
            NotificationType::RelistDetected => "RELIST_DETECTED",
        }
    }
}

/// Decides whether a watcher gets notified for a price event, and as what.
///
/// Filters run in order; any miss drops the watcher entirely. The target-price
/// check reclassifies the notification but never bypasses the preference and
/// threshold filters above it.
pub fn evaluate_price_event(entry: &WatchlistEntry, delta: &PriceDelta) -> Option<NotificationType> {
    if delta.is_drop() && !entry.notify_price_drop {
        return None;
    }
    if delta.amount > 0 && !entry.notify_price_rise {
        return None;
    }

    if let Some(threshold) = entry.price_drop_threshold {
        if delta.amount.abs() < threshold {
            return None;
        }
    }

    if let Some(target) = entry.target_price {
        if delta.new <= target {
            return Some(NotificationType::TargetPriceHit);
        }
    }

    Some(if delta.is_drop() {
        NotificationType::PriceDrop
    } else {
        NotificationType::PriceRise
    })
}

/// Decides whether a watcher gets notified for a status event, and as what.
/// A transition to relisted renders as a relist alert for watchers who opted
/// into those; like the target-price rule this only affects classification.
pub fn evaluate_status_event(
    entry: &WatchlistEntry,
    new_status: VehicleStatus,
) -> Option<NotificationType> {
    if !entry.notify_status_change {
        return None;
    }
    if new_status == VehicleStatus::Relisted && entry.notify_relist {
        return Some(NotificationType::RelistDetected);
    }
    Some(NotificationType::StatusChange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry() -> WatchlistEntry {
        WatchlistEntry {
            id: 1,
            user_id: 1,
            vehicle_id: 1,
            price_when_added: Some(2_000_000),
            notify_price_drop: true,
            notify_price_rise: false,
            notify_status_change: true,
            notify_relist: true,
            price_drop_threshold: None,
            target_price: None,
            last_notified_at: None,
            added_at: NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    fn drop_of(amount: i64) -> PriceDelta {
        PriceDelta {
            previous: 2_000_000,
            new: 2_000_000 - amount,
            amount: -amount,
            percent: -(amount as f64) / 2_000_000.0 * 100.0,
        }
    }

    #[test]
    fn drop_preference_off_suppresses_notification() {
        let mut e = entry();
        e.notify_price_drop = false;
        assert_eq!(evaluate_price_event(&e, &drop_of(200_000)), None);
    }

    #[test]
    fn rise_preference_off_suppresses_notification() {
        let e = entry();
        let rise = PriceDelta {
            previous: 2_000_000,
            new: 2_100_000,
            amount: 100_000,
            percent: 5.0,
        };
        assert_eq!(evaluate_price_event(&e, &rise), None);
    }

    #[test]
    fn threshold_filters_small_drops() {
        let mut e = entry();
        e.price_drop_threshold = Some(50_000);
        assert_eq!(
            evaluate_price_event(&e, &drop_of(200_000)),
            Some(NotificationType::PriceDrop)
        );
        e.price_drop_threshold = Some(500_000);
        assert_eq!(evaluate_price_event(&e, &drop_of(200_000)), None);
    }

    #[test]
    fn target_price_reclassifies_but_does_not_bypass_filters() {
        let mut e = entry();
        e.target_price = Some(1_900_000);
        assert_eq!(
            evaluate_price_event(&e, &drop_of(200_000)),
            Some(NotificationType::TargetPriceHit)
        );

        // Same target, but the drop preference is off: still nothing.
        e.notify_price_drop = false;
        assert_eq!(evaluate_price_event(&e, &drop_of(200_000)), None);
    }

    #[test]
    fn status_preference_gates_status_events() {
        let mut e = entry();
        assert_eq!(
            evaluate_status_event(&e, VehicleStatus::Sold),
            Some(NotificationType::StatusChange)
        );
        e.notify_status_change = false;
        assert_eq!(evaluate_status_event(&e, VehicleStatus::Sold), None);
    }

    #[test]
    fn relist_classifies_separately_when_opted_in() {
        let mut e = entry();
        assert_eq!(
            evaluate_status_event(&e, VehicleStatus::Relisted),
            Some(NotificationType::RelistDetected)
        );
        e.notify_relist = false;
        assert_eq!(
            evaluate_status_event(&e, VehicleStatus::Relisted),
            Some(NotificationType::StatusChange)
        );
    }
}
