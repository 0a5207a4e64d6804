// src/domain/snapshot.rs

use crate::domain::fingerprint::{generate_fingerprint, FingerprintInput};
use crate::domain::vehicle::{normalize_source, SellerType, VehicleStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One normalized observation as submitted by a marketplace adapter (browser
/// extension) or injected by the staleness scheduler. Field extraction and
/// validation happen upstream; this layer only normalizes identity fields.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotPayload {
    pub url: String,
    pub source: String,
    pub vin: Option<String>,
    pub year: Option<i64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    /// Major units (e.g. dollars) as submitted; converted to cents once here.
    pub price: Option<f64>,
    pub mileage: Option<i64>,
    pub exterior_color: Option<String>,
    pub interior_color: Option<String>,
    pub body_style: Option<String>,
    pub transmission: Option<String>,
    pub drivetrain: Option<String>,
    pub fuel_type: Option<String>,
    pub engine: Option<String>,
    pub seller_name: Option<String>,
    pub seller_type: Option<String>,
    pub seller_location: Option<String>,
    pub seller_phone: Option<String>,
    pub photo_urls: Vec<String>,
    pub status: Option<String>,
}

impl SnapshotPayload {
    /// VIN stripped of separators and upper-cased. A VIN is only trusted as an
    /// identity key when the normalized form is exactly 17 characters.
    pub fn normalized_vin(&self) -> Option<String> {
        let vin: String = self
            .vin
            .as_deref()?
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        if vin.is_empty() {
            None
        } else {
            Some(vin)
        }
    }

    /// Price in minor units (cents), the unit every stored price uses.
    pub fn price_cents(&self) -> Option<i64> {
        self.price.map(|p| (p * 100.0).round() as i64)
    }

    pub fn status(&self) -> Option<VehicleStatus> {
        self.status.as_deref().map(VehicleStatus::parse)
    }

    pub fn seller_type(&self) -> Option<SellerType> {
        self.seller_type.as_deref().map(SellerType::parse)
    }

    pub fn normalized_source(&self) -> &'static str {
        normalize_source(&self.source)
    }

    pub fn fingerprint(&self) -> String {
        generate_fingerprint(&FingerprintInput {
            year: self.year,
            make: self.make.as_deref(),
            model: self.model.as_deref(),
            trim: self.trim.as_deref(),
            mileage: self.mileage,
            price: self.price_cents(),
            seller_location: self.seller_location.as_deref(),
        })
    }
}

/// An immutable stored observation. Never mutated or deleted by the engine;
/// retention is an external concern.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub id: i64,
    pub vehicle_id: i64,
    /// None when the snapshot was injected by the system actor.
    pub captured_by: Option<i64>,
    pub price: Option<i64>,
    pub mileage: Option<i64>,
    pub status: VehicleStatus,
    pub source: String,
    pub source_url: String,
    pub captured_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vin_normalization_strips_separators_and_uppercases() {
        let payload = SnapshotPayload {
            vin: Some("1hgcm82633a-00 4352".to_string()),
            ..Default::default()
        };
        assert_eq!(payload.normalized_vin().as_deref(), Some("1HGCM82633A004352"));
    }

    #[test]
    fn empty_vin_normalizes_to_none() {
        let payload = SnapshotPayload {
            vin: Some("--".to_string()),
            ..Default::default()
        };
        assert_eq!(payload.normalized_vin(), None);
    }

    #[test]
    fn price_converts_to_cents_once() {
        let payload = SnapshotPayload {
            price: Some(21502.49),
            ..Default::default()
        };
        assert_eq!(payload.price_cents(), Some(2_150_249));
    }
}
