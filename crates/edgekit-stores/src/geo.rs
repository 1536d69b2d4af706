use std::net::IpAddr;

use edgekit_core::transport::Collaborator;
use edgekit_core::{Context, Result};
use serde::{Deserialize, Serialize};

/// Geographic data for an IP address. Fields the platform has no data for
/// keep their default value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geo {
    /// Organization behind `as_number`.
    pub as_name: String,
    /// Autonomous system number.
    pub as_number: i64,
    pub area_code: i64,
    pub city: String,
    pub conn_speed: String,
    pub conn_type: String,
    /// Two-character UN M.49 continent code.
    #[serde(rename = "continent")]
    pub continent_code: String,
    /// ISO 3166-1 alpha-2.
    pub country_code: String,
    /// ISO 3166-1 alpha-3.
    pub country_code3: String,
    pub country_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub metro_code: i64,
    pub postal_code: String,
    pub proxy_description: String,
    pub proxy_type: String,
    /// ISO 3166-2 subdivision code.
    pub region: String,
    /// Offset from UTC, as `±HHMM`.
    pub utc_offset: i64,
}

/// Geolocation for `ip`. An address the platform knows nothing about
/// yields the default record, not an error.
pub fn lookup(ctx: &Context, ip: IpAddr) -> Result<Geo> {
    let transport = ctx.transport()?;
    let payload = transport.lookup(&Collaborator::Geo, &ip.to_string())?;
    if payload.is_empty() {
        return Ok(Geo::default());
    }
    Ok(serde_json::from_slice(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgekit_core::{Error, MemoryTransport};
    use std::sync::Arc;

    fn ctx(entries: Vec<(&'static str, &'static str)>) -> Context {
        let transport = MemoryTransport::new();
        transport.store(Collaborator::Geo, entries);
        Context::background().with_transport(Arc::new(transport))
    }

    #[test]
    fn decodes_platform_record() {
        let ctx = ctx(vec![(
            "203.0.113.7",
            r#"{"as_name":"example net","as_number":64500,"city":"london","continent":"EU",
                "country_code":"GB","country_code3":"GBR","latitude":51.5,"longitude":-0.12,
                "utc_offset":0,"region":"ENG","unknown_field":true}"#,
        )]);
        let geo = lookup(&ctx, "203.0.113.7".parse().unwrap()).unwrap();
        assert_eq!(geo.city, "london");
        assert_eq!(geo.continent_code, "EU");
        assert_eq!(geo.as_number, 64500);
        assert_eq!(geo.country_code3, "GBR");
        assert_eq!(geo.postal_code, "");
    }

    #[test]
    fn unknown_address_is_default() {
        let geo = lookup(&ctx(vec![]), "198.51.100.1".parse().unwrap()).unwrap();
        assert_eq!(geo, Geo::default());
    }

    #[test]
    fn malformed_payload_is_decode_error() {
        let ctx = ctx(vec![("192.0.2.1", "{not json")]);
        let err = lookup(&ctx, "192.0.2.1".parse().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
