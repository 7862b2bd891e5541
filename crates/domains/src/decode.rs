//! # Decode Boundary
//!
//! Turns raw [`Document`]s into entities, failing with a typed [`DecodeError`]
//! instead of coercing malformed fields.

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::document::Document;
use crate::models::{
    Comment, CommentId, Coordinates, PlaceTag, PointId, Route, RouteId, RoutePoint, UserId,
    Visibility,
};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed document {collection}/{id}: field `{field}` {reason}")]
pub struct DecodeError {
    pub collection: String,
    pub id: String,
    pub field: String,
    pub reason: String,
}

/// Entities that can be decoded from a stored document.
pub trait FromDocument: Sized {
    /// Collection name used in error reports.
    const COLLECTION: &'static str;

    fn from_document(doc: &Document) -> Result<Self, DecodeError>;
}

/// Field accessor that reports failures against one document.
struct Fields<'a> {
    doc: &'a Document,
    collection: &'static str,
}

impl<'a> Fields<'a> {
    fn new(doc: &'a Document, collection: &'static str) -> Self {
        Self { doc, collection }
    }

    fn error(&self, field: &str, reason: impl Into<String>) -> DecodeError {
        DecodeError {
            collection: self.collection.to_owned(),
            id: self.doc.id.clone(),
            field: field.to_owned(),
            reason: reason.into(),
        }
    }

    fn required(&self, field: &str) -> Result<&'a Value, DecodeError> {
        self.doc.field(field).ok_or_else(|| self.error(field, "is missing"))
    }

    fn string(&self, field: &str) -> Result<String, DecodeError> {
        match self.required(field)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.error(field, format!("expected a string, got {other}"))),
        }
    }

    fn non_empty_string(&self, field: &str) -> Result<String, DecodeError> {
        let s = self.string(field)?;
        if s.trim().is_empty() {
            return Err(self.error(field, "is empty"));
        }
        Ok(s)
    }

    /// Blank strings read as absent.
    fn optional_string(&self, field: &str) -> Result<Option<String>, DecodeError> {
        match self.doc.field(field) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.error(field, format!("expected a string, got {other}"))),
        }
    }

    fn finite(&self, field: &str) -> Result<f64, DecodeError> {
        self.required(field)?
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.error(field, "expected a finite number"))
    }

    fn integer(&self, field: &str) -> Result<u64, DecodeError> {
        let value = self.required(field)?;
        if let Some(n) = value.as_u64() {
            return Ok(n);
        }
        match value.as_f64() {
            Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
            _ => Err(self.error(field, "expected a non-negative integer")),
        }
    }

    fn integer_or(&self, field: &str, default: u64) -> Result<u64, DecodeError> {
        if self.doc.field(field).is_none() {
            return Ok(default);
        }
        self.integer(field)
    }

    fn u32(&self, field: &str) -> Result<u32, DecodeError> {
        u32::try_from(self.integer(field)?).map_err(|_| self.error(field, "is out of range"))
    }

    fn positive_u32(&self, field: &str) -> Result<u32, DecodeError> {
        match self.u32(field)? {
            0 => Err(self.error(field, "must be positive")),
            n => Ok(n),
        }
    }

    fn bool_or(&self, field: &str, default: bool) -> Result<bool, DecodeError> {
        match self.doc.field(field) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(self.error(field, format!("expected a bool, got {other}"))),
        }
    }

    /// Server timestamps may still be pending on freshly written documents.
    fn timestamp(&self, field: &str) -> Result<Option<DateTime<Utc>>, DecodeError> {
        match self.doc.field(field) {
            None => Ok(None),
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|e| self.error(field, format!("is not an RFC 3339 timestamp: {e}"))),
            Some(other) => Err(self.error(field, format!("expected a timestamp, got {other}"))),
        }
    }
}

impl FromDocument for RoutePoint {
    const COLLECTION: &'static str = "points";

    fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let f = Fields::new(doc, Self::COLLECTION);
        let raw_category = f.string("category")?;
        let category = PlaceTag::parse(&raw_category)
            .ok_or_else(|| f.error("category", format!("unknown place tag `{raw_category}`")))?;
        let lat = f.finite("lat")?;
        let lng = f.finite("lng")?;
        let coordinates = Coordinates::new(lat, lng).map_err(|e| f.error("lat", e.to_string()))?;

        Ok(RoutePoint {
            id: PointId::new(doc.id.clone()),
            title: f.non_empty_string("title")?,
            description: f.optional_string("description")?,
            address: f.optional_string("address")?,
            photo_url: f.optional_string("photoUrl")?,
            category,
            order: f.positive_u32("order")?,
            coordinates,
            created_at: f.timestamp("createdAt")?,
            updated_at: f.timestamp("updatedAt")?,
        })
    }
}

impl FromDocument for Route {
    const COLLECTION: &'static str = "routes";

    fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let f = Fields::new(doc, Self::COLLECTION);
        let is_public = f.bool_or("isPublic", false)?;
        // Older documents only carry `isPublic`.
        let visibility = match doc.field("visibility").and_then(Value::as_str) {
            Some("public") => Visibility::Public,
            Some("unlisted") => Visibility::Unlisted,
            _ if is_public => Visibility::Public,
            _ => Visibility::Unlisted,
        };

        Ok(Route {
            id: RouteId::new(doc.id.clone()),
            title: f.string("title")?,
            city: f.string("city")?,
            days: f.u32("days")?,
            visibility,
            cover_photo_url: f.optional_string("coverPhotoUrl")?,
            likes_count: f.integer_or("likesCount", 0)?,
            owner_id: UserId::new(f.non_empty_string("ownerId")?),
            owner_display_name: f.optional_string("ownerDisplayName")?,
            created_at: f.timestamp("createdAt")?,
            updated_at: f.timestamp("updatedAt")?,
        })
    }
}

impl FromDocument for Comment {
    const COLLECTION: &'static str = "comments";

    fn from_document(doc: &Document) -> Result<Self, DecodeError> {
        let f = Fields::new(doc, Self::COLLECTION);
        let author = match f.optional_string("userId")? {
            Some(id) => id,
            None => f.non_empty_string("authorId")?,
        };

        Ok(Comment {
            id: CommentId::new(doc.id.clone()),
            author_id: UserId::new(author),
            author_name: f.optional_string("userName")?,
            author_photo_url: f.optional_string("userPhotoUrl")?,
            text: f.string("text")?,
            created_at: f.timestamp("createdAt")?,
        })
    }
}

/// Decodes every document, failing on the first malformed one.
pub fn decode_all<T: FromDocument>(docs: &[Document]) -> Result<Vec<T>, DecodeError> {
    docs.iter().map(T::from_document).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, fields: Value) -> Document {
        Document {
            id: id.into(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn decodes_a_point_and_drops_blank_optionals() {
        let d = doc(
            "p1",
            json!({
                "title": "Hermitage", "category": "museum", "order": 1,
                "lat": 59.94, "lng": 30.31, "address": "  ",
                "createdAt": "2026-05-01T10:00:00Z"
            }),
        );
        let p = RoutePoint::from_document(&d).unwrap();
        assert_eq!(p.id.as_str(), "p1");
        assert_eq!(p.category, PlaceTag::Museum);
        assert_eq!(p.address, None);
        assert!(p.created_at.is_some());
        assert!(p.updated_at.is_none());
    }

    #[test]
    fn rejects_points_with_bad_fields() {
        let base = json!({"title": "X", "category": "museum", "order": 1, "lat": 1.0, "lng": 2.0});

        let mut no_lat = base.clone();
        no_lat.as_object_mut().unwrap().remove("lat");
        let err = RoutePoint::from_document(&doc("p", no_lat)).unwrap_err();
        assert_eq!(err.field, "lat");

        let mut bad_tag = base.clone();
        bad_tag["category"] = json!("casino");
        assert_eq!(RoutePoint::from_document(&doc("p", bad_tag)).unwrap_err().field, "category");

        let mut frac_order = base.clone();
        frac_order["order"] = json!(1.5);
        assert_eq!(RoutePoint::from_document(&doc("p", frac_order)).unwrap_err().field, "order");

        let mut zero_order = base;
        zero_order["order"] = json!(0);
        let err = RoutePoint::from_document(&doc("p", zero_order)).unwrap_err();
        assert_eq!(err.field, "order");
        assert_eq!(err.reason, "must be positive");
    }

    #[test]
    fn route_visibility_falls_back_to_is_public() {
        let r = Route::from_document(&doc(
            "r1",
            json!({"title": "Oslo", "city": "Oslo", "days": 2, "isPublic": true, "ownerId": "u1"}),
        ))
        .unwrap();
        assert_eq!(r.visibility, Visibility::Public);
        assert_eq!(r.likes_count, 0);

        let r = Route::from_document(&doc(
            "r2",
            json!({"title": "Oslo", "city": "Oslo", "days": 2, "visibility": "weird", "ownerId": "u1"}),
        ))
        .unwrap();
        assert_eq!(r.visibility, Visibility::Unlisted);
    }

    #[test]
    fn comment_author_accepts_legacy_field() {
        let c = Comment::from_document(&doc("c1", json!({"authorId": "u9", "text": "nice"}))).unwrap();
        assert_eq!(c.author_id.as_str(), "u9");
        assert!(Comment::from_document(&doc("c2", json!({"text": "orphan"}))).is_err());
    }
}
