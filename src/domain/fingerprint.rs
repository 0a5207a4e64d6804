// src/domain/fingerprint.rs

/// The partial attribute set a fingerprint is derived from. Every field is
/// optional; missing fields normalize to fixed sentinels so the output is
/// always well-formed.
#[derive(Debug, Default)]
pub struct FingerprintInput<'a> {
    pub year: Option<i64>,
    pub make: Option<&'a str>,
    pub model: Option<&'a str>,
    pub trim: Option<&'a str>,
    pub mileage: Option<i64>,
    /// Price in minor units (cents).
    pub price: Option<i64>,
    pub seller_location: Option<&'a str>,
}

/// Derives the fuzzy identity key used to match VIN-less listings.
///
/// Deterministic and total: the same input always yields the same key, and no
/// input can fail. Deliberately lossy: two distinct vehicles with similar
/// specs may collide, which is an accepted tradeoff for recall. The key is
/// never used as a unique constraint, only as a fallback match.
pub fn generate_fingerprint(input: &FingerprintInput) -> String {
    let year = input
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "XXXX".to_string());

    let make = normalize_word(input.make.unwrap_or("unknown"));
    let model = normalize_word(input.model.unwrap_or("unknown"));
    let trim = normalize_word(input.trim.unwrap_or(""));

    // Mileage buckets to the nearest 1,000 units ("87k"); price buckets to the
    // nearest 500 cents. Both keep nearby observations of the same car on the
    // same key even when the listing wobbles between refreshes.
    let mileage = match input.mileage {
        Some(m) => format!("{}k", ((m as f64) / 1000.0).round() as i64),
        None => "XXXk".to_string(),
    };

    let price = match input.price {
        Some(p) => ((((p as f64) / 500.0).round() as i64) * 500).to_string(),
        None => "XXXXX".to_string(),
    };

    let location: String = input
        .seller_location
        .unwrap_or("")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(10)
        .collect();

    [year, make, model, trim, mileage, price, location].join("|")
}

fn normalize_word(s: &str) -> String {
    s.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_input() -> FingerprintInput<'static> {
        FingerprintInput {
            year: Some(2019),
            make: Some("Honda"),
            model: Some("Civic Type R"),
            trim: Some("Touring"),
            mileage: Some(87_444),
            price: Some(2_150_249),
            seller_location: Some("Austin, TX 78701"),
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let input = full_input();
        assert_eq!(generate_fingerprint(&input), generate_fingerprint(&input));
    }

    #[test]
    fn fingerprint_normalizes_all_fields() {
        let fp = generate_fingerprint(&full_input());
        assert_eq!(fp, "2019|honda|civictyper|touring|87k|2150000|austintx78");
    }

    #[test]
    fn fingerprint_uses_sentinels_for_missing_fields() {
        let fp = generate_fingerprint(&FingerprintInput::default());
        assert_eq!(fp, "XXXX|unknown|unknown||XXXk|XXXXX|");
    }

    #[test]
    fn price_buckets_to_nearest_500() {
        let mut input = FingerprintInput::default();
        input.price = Some(1_234);
        let low = generate_fingerprint(&input);
        input.price = Some(1_266);
        let high = generate_fingerprint(&input);
        // 1234 rounds to 1000, 1266 rounds to 1500.
        assert_ne!(low, high);
        assert!(low.contains("|1000|"));
        assert!(high.contains("|1500|"));
    }

    #[test]
    fn mileage_buckets_to_nearest_thousand() {
        let mut input = FingerprintInput::default();
        input.mileage = Some(87_444);
        let a = generate_fingerprint(&input);
        input.mileage = Some(87_001);
        let b = generate_fingerprint(&input);
        assert_eq!(a, b);
    }
}
