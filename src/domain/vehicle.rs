// src/domain/vehicle.rs

use chrono::NaiveDateTime;
use serde::Serialize;

/// Listing lifecycle status. Stored lowercase; parsed case-insensitively so
/// marketplace adapters can submit whatever casing their DOM yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Active,
    Pending,
    Sold,
    Removed,
    Relisted,
    Unknown,
}

impl VehicleStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" => VehicleStatus::Active,
            "pending" => VehicleStatus::Pending,
            "sold" => VehicleStatus::Sold,
            "removed" => VehicleStatus::Removed,
            "relisted" => VehicleStatus::Relisted,
            _ => VehicleStatus::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VehicleStatus::Active => "active",
            VehicleStatus::Pending => "pending",
            VehicleStatus::Sold => "sold",
            VehicleStatus::Removed => "removed",
            VehicleStatus::Relisted => "relisted",
            VehicleStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SellerType {
    Dealer,
    Private,
    Unknown,
}

impl SellerType {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dealer" => SellerType::Dealer,
            "private" => SellerType::Private,
            _ => SellerType::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SellerType::Dealer => "dealer",
            SellerType::Private => "private",
            SellerType::Unknown => "unknown",
        }
    }
}

/// Maps the free-form source string a marketplace adapter reports to one of
/// the fixed tokens we store. Unrecognized marketplaces collapse to "unknown".
pub fn normalize_source(source: &str) -> &'static str {
    match source.to_lowercase().as_str() {
        "cars.com" | "cars_com" => "cars_com",
        "autotrader" => "autotrader",
        "cargurus" => "cargurus",
        "craigslist" => "craigslist",
        "facebook" => "facebook",
        "carfax" => "carfax",
        "carvana" => "carvana",
        "vroom" => "vroom",
        "dealer_site" => "dealer_site",
        _ => "unknown",
    }
}

/// Three-tier staleness classification of a vehicle's last observation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Recent,
    Stale,
}

/// Classifies `last_checked_at` relative to `now`: under 1 day is fresh,
/// under 6 days is recent, everything else (including exactly 1 / exactly 6
/// days) falls to the next tier down.
pub fn calculate_freshness(last_checked_at: NaiveDateTime, now: NaiveDateTime) -> Freshness {
    let age = now - last_checked_at;
    if age < chrono::Duration::days(1) {
        Freshness::Fresh
    } else if age < chrono::Duration::days(6) {
        Freshness::Recent
    } else {
        Freshness::Stale
    }
}

/// Canonical record for one physical car, deduplicated across marketplaces.
///
/// `vin` is globally unique when present. `fingerprint` is never unique; it
/// is a fuzzy fallback match key only. All prices are minor units (cents).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: i64,
    pub vin: Option<String>,
    pub fingerprint: String,

    pub year: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub exterior_color: Option<String>,
    pub interior_color: Option<String>,
    pub body_style: Option<String>,
    pub transmission: Option<String>,
    pub drivetrain: Option<String>,
    pub fuel_type: Option<String>,
    pub engine: Option<String>,

    pub current_price: Option<i64>,
    pub current_mileage: Option<i64>,
    pub current_status: VehicleStatus,
    pub lowest_price: Option<i64>,
    pub highest_price: Option<i64>,
    pub price_drop_count: i64,

    pub seller_name: Option<String>,
    pub seller_type: SellerType,
    pub seller_location: Option<String>,
    pub seller_phone: Option<String>,

    pub primary_photo_url: Option<String>,
    pub photo_urls: Vec<String>,

    pub sources: Vec<String>,
    pub source_urls: Vec<String>,

    pub last_checked_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Vehicle {
    /// Display name used in notification titles and email subjects.
    pub fn display_name(&self) -> String {
        let name = [
            self.year.map(|y| y.to_string()),
            self.make.clone(),
            self.model.clone(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

        if name.is_empty() {
            "Your watched vehicle".to_string()
        } else {
            name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn freshness_tiers() {
        let now = at(10, 12);
        assert_eq!(calculate_freshness(at(10, 2), now), Freshness::Fresh);
        assert_eq!(calculate_freshness(at(7, 12), now), Freshness::Recent);
        assert_eq!(calculate_freshness(at(1, 12), now), Freshness::Stale);
    }

    #[test]
    fn freshness_boundary_at_exactly_one_day_is_recent() {
        let now = at(10, 12);
        assert_eq!(calculate_freshness(at(9, 12), now), Freshness::Recent);
    }

    #[test]
    fn freshness_boundary_at_exactly_six_days_is_stale() {
        let now = at(10, 12);
        assert_eq!(calculate_freshness(at(4, 12), now), Freshness::Stale);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(VehicleStatus::parse("SOLD"), VehicleStatus::Sold);
        assert_eq!(VehicleStatus::parse("Active"), VehicleStatus::Active);
        assert_eq!(VehicleStatus::parse("gone"), VehicleStatus::Unknown);
    }

    #[test]
    fn source_normalization_collapses_unrecognized() {
        assert_eq!(normalize_source("Cars.com"), "cars_com");
        assert_eq!(normalize_source("CRAIGSLIST"), "craigslist");
        assert_eq!(normalize_source("ebay-motors"), "unknown");
    }
}
