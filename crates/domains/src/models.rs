//! # Domain Models
//!
//! Strongly-typed entities produced by the decode boundary in [`crate::decode`].
//! Identifiers are opaque strings assigned by the persistence collaborator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a route document.
    RouteId
);
opaque_id!(
    /// Identifier of a point inside `routes/{route}/points`.
    PointId
);
opaque_id!(
    /// Identifier of a comment inside `routes/{route}/comments`.
    CommentId
);
opaque_id!(
    /// Identifier of an authenticated actor.
    UserId
);

/// Fixed set of place categories a point can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceTag {
    Architecture,
    Bar,
    History,
    Cafe,
    Picnic,
    Cuisine,
    Museum,
    Park,
    Beach,
    Restaurant,
    Theater,
    Photo,
    #[default]
    Other,
}

impl PlaceTag {
    pub const ALL: [PlaceTag; 13] = [
        PlaceTag::Architecture,
        PlaceTag::Bar,
        PlaceTag::History,
        PlaceTag::Cafe,
        PlaceTag::Picnic,
        PlaceTag::Cuisine,
        PlaceTag::Museum,
        PlaceTag::Park,
        PlaceTag::Beach,
        PlaceTag::Restaurant,
        PlaceTag::Theater,
        PlaceTag::Photo,
        PlaceTag::Other,
    ];

    /// Stored representation (`"museum"`, `"cafe"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            PlaceTag::Architecture => "architecture",
            PlaceTag::Bar => "bar",
            PlaceTag::History => "history",
            PlaceTag::Cafe => "cafe",
            PlaceTag::Picnic => "picnic",
            PlaceTag::Cuisine => "cuisine",
            PlaceTag::Museum => "museum",
            PlaceTag::Park => "park",
            PlaceTag::Beach => "beach",
            PlaceTag::Restaurant => "restaurant",
            PlaceTag::Theater => "theater",
            PlaceTag::Photo => "photo",
            PlaceTag::Other => "other",
        }
    }

    /// Human-readable label shown next to the point.
    pub fn label(self) -> &'static str {
        match self {
            PlaceTag::Architecture => "Architecture",
            PlaceTag::Bar => "Bar",
            PlaceTag::History => "Historic site",
            PlaceTag::Cafe => "Coffee shop",
            PlaceTag::Picnic => "Picnic",
            PlaceTag::Cuisine => "Local cuisine",
            PlaceTag::Museum => "Museum",
            PlaceTag::Park => "Park",
            PlaceTag::Beach => "Beach",
            PlaceTag::Restaurant => "Restaurant",
            PlaceTag::Theater => "Theater",
            PlaceTag::Photo => "Photo spot",
            PlaceTag::Other => "Other",
        }
    }

    /// Marker preset used by the map widget.
    pub fn map_preset(self) -> &'static str {
        match self {
            PlaceTag::Architecture => "islands#lightBlueLeisureIcon",
            PlaceTag::Bar => "islands#pinkBarIcon",
            PlaceTag::History => "islands#nightLeisureIcon",
            PlaceTag::Cafe => "islands#darkOrangeFoodIcon",
            PlaceTag::Picnic => "islands#oliveVegetationIcon",
            PlaceTag::Cuisine => "islands#darkBlueFoodIcon",
            PlaceTag::Museum => "islands#brownLeisureIcon",
            PlaceTag::Park => "islands#greenVegetationIcon",
            PlaceTag::Beach => "islands#yellowBeachIcon",
            PlaceTag::Restaurant => "islands#blueFoodIcon",
            PlaceTag::Theater => "islands#orangeTheaterIcon",
            PlaceTag::Photo => "islands#darkGreenObservationIcon",
            PlaceTag::Other => "islands#grayGovernmentIcon",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == raw)
    }
}

impl fmt::Display for PlaceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A WGS84 location. Both components are always finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    lat: f64,
    lng: f64,
}

impl Coordinates {
    /// Where the map opens when nothing else is known.
    pub const DEFAULT_CENTER: Coordinates = Coordinates {
        lat: 55.751244,
        lng: 37.618423,
    };

    pub fn new(lat: f64, lng: f64) -> Result<Self, AppError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(AppError::ValidationError(format!(
                "coordinates must be finite, got ({lat}, {lng})"
            )));
        }
        Ok(Self { lat, lng })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// Arithmetic midpoint; adequate for the short hops between stops of a city route.
    pub fn midpoint(&self, other: &Coordinates) -> Coordinates {
        Coordinates {
            lat: self.lat / 2.0 + other.lat / 2.0,
            lng: self.lng / 2.0 + other.lng / 2.0,
        }
    }

    /// Initial great-circle bearing towards `other`, in degrees within `[0, 360)`.
    pub fn bearing_to(&self, other: &Coordinates) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let delta = (other.lng - self.lng).to_radians();
        let y = delta.sin() * phi2.cos();
        let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta.cos();
        (y.atan2(x).to_degrees() + 360.0) % 360.0
    }
}

/// A single geolocated stop within a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub id: PointId,
    pub title: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub photo_url: Option<String>,
    pub category: PlaceTag,
    /// Position in the visiting sequence. Unique in the common case, duplicates are tolerated.
    pub order: u32,
    pub coordinates: Coordinates,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
        }
    }

    pub fn is_public(self) -> bool {
        matches!(self, Visibility::Public)
    }
}

/// An owned, titled collection of ordered points for a city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub title: String,
    pub city: String,
    pub days: u32,
    pub visibility: Visibility,
    pub cover_photo_url: Option<String>,
    pub likes_count: u64,
    pub owner_id: UserId,
    pub owner_display_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Route {
    pub fn is_public(&self) -> bool {
        self.visibility.is_public()
    }
}

/// A comment left on a route. Text is immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author_id: UserId,
    pub author_name: Option<String>,
    pub author_photo_url: Option<String>,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// The current signed-in actor as reported by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl Actor {
    /// Name shown next to the actor's content; falls back to the e-mail address.
    pub fn public_name(&self) -> Option<&str> {
        non_blank(self.display_name.as_deref()).or_else(|| non_blank(self.email.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_tag_parse_covers_every_variant() {
        for tag in PlaceTag::ALL {
            assert_eq!(PlaceTag::parse(tag.as_str()), Some(tag));
        }
        assert_eq!(PlaceTag::parse("casino"), None);
    }

    #[test]
    fn coordinates_reject_non_finite() {
        assert!(Coordinates::new(f64::NAN, 30.0).is_err());
        assert!(Coordinates::new(59.9, f64::INFINITY).is_err());
        let c = Coordinates::new(59.94, 30.31).unwrap();
        assert_eq!((c.lat(), c.lng()), (59.94, 30.31));
    }

    #[test]
    fn bearing_points_along_the_compass() {
        let origin = Coordinates::new(0.0, 0.0).unwrap();
        let north = Coordinates::new(1.0, 0.0).unwrap();
        let east = Coordinates::new(0.0, 1.0).unwrap();
        let west = Coordinates::new(0.0, -1.0).unwrap();
        assert!(origin.bearing_to(&north).abs() < 1e-9);
        assert!((origin.bearing_to(&east) - 90.0).abs() < 1e-9);
        assert!((origin.bearing_to(&west) - 270.0).abs() < 1e-9);

        let mid = north.midpoint(&east);
        assert_eq!((mid.lat(), mid.lng()), (0.5, 0.5));
    }

    #[test]
    fn actor_public_name_falls_back_to_email() {
        let actor = Actor {
            id: UserId::from("u1"),
            display_name: Some("  ".into()),
            email: Some("anna@example.com".into()),
            photo_url: None,
        };
        assert_eq!(actor.public_name(), Some("anna@example.com"));
    }
}
