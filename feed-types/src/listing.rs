//! Listing - one classified ad as served by the feed.
//!
//! Field names on the wire are camelCase JSON; the feed omits optional
//! fields rather than sending nulls, so everything optional defaults.

use serde::{Deserialize, Serialize};

/// One classified vehicle ad.
///
/// `id` is the stable identifier the engine deduplicates on. All other
/// fields are presentation payload and pass through the engine untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Stable unique identifier (uniqueness scope: current window).
    pub id: String,
    /// Ad title.
    pub title: String,
    /// Display price, preformatted by the feed.
    pub price: String,
    /// Seller location.
    pub location: String,
    /// Source URL of the ad.
    pub link: String,
    /// Image URI.
    pub image: String,
    /// Optional Google Maps URI for the location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_maps_link: Option<String>,
    /// Optional seller phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Optional nested detail record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_info: Option<DetailedInfo>,
}

/// Nested detail record attached to some listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedInfo {
    /// First registration date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Mileage as displayed by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mileage: Option<String>,
    /// Engine power as displayed by the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<String>,
    /// Prebuilt Google search URL for the ad title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_search_url_name: Option<String>,
}

impl Listing {
    /// Create a minimal listing for testing.
    pub fn minimal(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: format!("listing {id}"),
            price: "€ 1.000".to_string(),
            location: "Wien".to_string(),
            link: format!("https://ads.example/{id}"),
            image: format!("https://img.example/{id}.jpg"),
            google_maps_link: None,
            phone_number: None,
            detailed_info: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_roundtrip() {
        let listing = Listing {
            google_maps_link: Some("https://maps.google.com/?q=Wien".into()),
            phone_number: Some("+43 660 0000000".into()),
            detailed_info: Some(DetailedInfo {
                date: Some("2019-03".into()),
                mileage: Some("120.000 km".into()),
                power: Some("110 kW".into()),
                google_search_url_name: Some("https://google.com/search?q=pickup".into()),
            }),
            ..Listing::minimal("abc-1")
        };

        let json = serde_json::to_string(&listing).unwrap();
        let restored: Listing = serde_json::from_str(&json).unwrap();

        assert_eq!(listing, restored);
    }

    #[test]
    fn listing_uses_camel_case_field_names() {
        let listing = Listing {
            google_maps_link: Some("https://maps.google.com".into()),
            detailed_info: Some(DetailedInfo {
                google_search_url_name: Some("https://google.com".into()),
                ..DetailedInfo::default()
            }),
            ..Listing::minimal("x")
        };

        let json = serde_json::to_string(&listing).unwrap();
        assert!(json.contains("googleMapsLink"));
        assert!(json.contains("googleSearchUrlName"));
        assert!(!json.contains("google_maps_link"));
    }

    #[test]
    fn optional_fields_may_be_absent_on_the_wire() {
        let json = r#"{
            "id": "77",
            "title": "Pickup",
            "price": "€ 9.500",
            "location": "Graz",
            "link": "https://ads.example/77",
            "image": "https://img.example/77.jpg"
        }"#;

        let listing: Listing = serde_json::from_str(json).unwrap();

        assert_eq!(listing.id, "77");
        assert!(listing.google_maps_link.is_none());
        assert!(listing.phone_number.is_none());
        assert!(listing.detailed_info.is_none());
    }

    #[test]
    fn detailed_info_fields_all_optional() {
        let json = r#"{
            "id": "5",
            "title": "Van",
            "price": "€ 4.000",
            "location": "Linz",
            "link": "https://ads.example/5",
            "image": "https://img.example/5.jpg",
            "detailedInfo": { "mileage": "80.000 km" }
        }"#;

        let listing: Listing = serde_json::from_str(json).unwrap();
        let info = listing.detailed_info.unwrap();

        assert_eq!(info.mileage.as_deref(), Some("80.000 km"));
        assert!(info.date.is_none());
        assert!(info.power.is_none());
    }
}
