//! Yandex geocoder adapter.
//!
//! Response parsing is always available; the HTTP client sits behind `geocoder-http`.

use domains::GeocodeResult;
use serde_json::Value;

pub const GEOCODER_ENDPOINT: &str = "https://geocode-maps.yandex.ru/1.x/";

/// Extracts the first feature member of a geocoder response.
/// Positions arrive as `"<lng> <lat>"`; anything malformed or non-finite yields `None`.
pub fn parse_response(json: &Value) -> Option<GeocodeResult> {
    let geo = json
        .pointer("/response/GeoObjectCollection/featureMember/0/GeoObject")?
        .as_object()?;
    let pos = geo.get("Point")?.get("pos")?.as_str()?;
    let meta = geo.get("metaDataProperty")?.get("GeocoderMetaData")?;
    let address = meta.get("text")?.as_str()?;
    let precision = meta.get("precision").and_then(Value::as_str).map(str::to_owned);

    let mut parts = pos.split_whitespace();
    let lng: f64 = parts.next()?.parse().ok()?;
    let lat: f64 = parts.next()?.parse().ok()?;
    if !lat.is_finite() || !lng.is_finite() {
        return None;
    }

    Some(GeocodeResult {
        address: address.to_owned(),
        lat,
        lng,
        precision,
    })
}

#[cfg(feature = "geocoder-http")]
pub use http::HttpGeocoder;

#[cfg(feature = "geocoder-http")]
mod http {
    use async_trait::async_trait;
    use domains::{GeocodeResult, Geocoder, MapError};
    use tracing::debug;

    use super::{parse_response, GEOCODER_ENDPOINT};

    pub struct HttpGeocoder {
        client: reqwest::Client,
        api_key: String,
        endpoint: String,
    }

    impl HttpGeocoder {
        pub fn new(api_key: impl Into<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                api_key: api_key.into(),
                endpoint: GEOCODER_ENDPOINT.to_owned(),
            }
        }

        pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
            self.endpoint = endpoint.into();
            self
        }
    }

    #[async_trait]
    impl Geocoder for HttpGeocoder {
        async fn geocode(&self, query: &str) -> Result<Option<GeocodeResult>, MapError> {
            if self.api_key.is_empty() {
                return Err(MapError::Geocoder("geocoder API key is missing".into()));
            }
            let json: serde_json::Value = self
                .client
                .get(&self.endpoint)
                .query(&[("format", "json"), ("apikey", &self.api_key), ("geocode", query)])
                .send()
                .await
                .map_err(|e| MapError::Geocoder(e.to_string()))?
                .json()
                .await
                .map_err(|e| MapError::Geocoder(e.to_string()))?;

            let result = parse_response(&json);
            debug!(query, found = result.is_some(), "geocoded");
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(pos: &str) -> Value {
        json!({
            "response": {"GeoObjectCollection": {"featureMember": [{
                "GeoObject": {
                    "Point": {"pos": pos},
                    "metaDataProperty": {"GeocoderMetaData": {
                        "text": "Russia, Saint Petersburg, Palace Square, 2",
                        "precision": "exact"
                    }}
                }
            }]}}
        })
    }

    #[test]
    fn parses_lng_lat_order() {
        let r = parse_response(&response("30.314130 59.939844")).unwrap();
        assert_eq!(r.lat, 59.939844);
        assert_eq!(r.lng, 30.314130);
        assert_eq!(r.precision.as_deref(), Some("exact"));
    }

    #[test]
    fn malformed_responses_yield_none() {
        assert!(parse_response(&json!({})).is_none());
        assert!(parse_response(&response("abc 59.9")).is_none());
        assert!(parse_response(&response("30.3")).is_none());
        assert!(parse_response(&json!({"response": {"GeoObjectCollection": {"featureMember": []}}})).is_none());
    }
}
