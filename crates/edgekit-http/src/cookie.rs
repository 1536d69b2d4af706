//! `Cookie` and `Set-Cookie` header grammar.
//!
//! Values are percent-encoded on the way out so that bytes outside the
//! cookie-octet set (`;`, `,`, whitespace, quotes, backslash, controls and
//! `%` itself) survive a round trip through a header unchanged.

use std::fmt::{self, Write as _};

use edgekit_core::{Error, Result};

use crate::header::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("strict") {
            Some(SameSite::Strict)
        } else if s.eq_ignore_ascii_case("lax") {
            Some(SameSite::Lax)
        } else if s.eq_ignore_ascii_case("none") {
            Some(SameSite::None)
        } else {
            None
        }
    }
}

/// An HTTP cookie as sent in `Set-Cookie` or received in `Cookie`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    /// `Some(n)` with `n <= 0` expires the cookie immediately.
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Serialize as a `Set-Cookie` value:
    /// `Name=Value; Path=P; Domain=D; Max-Age=N; Secure; HttpOnly; SameSite=X`,
    /// with only the attributes that are set.
    pub fn to_set_cookie(&self) -> Result<String> {
        validate_name(&self.name)?;
        let mut out = format!("{}={}", self.name, encode_value(&self.value));
        if let Some(path) = &self.path {
            validate_attr("Path", path)?;
            let _ = write!(out, "; Path={path}");
        }
        if let Some(domain) = &self.domain {
            validate_attr("Domain", domain)?;
            let _ = write!(out, "; Domain={}", domain.trim_start_matches('.'));
        }
        if let Some(max_age) = self.max_age {
            let _ = write!(out, "; Max-Age={}", max_age.max(0));
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            let _ = write!(out, "; SameSite={}", same_site.as_str());
        }
        Ok(out)
    }

    /// Parse one `Set-Cookie` value. Unknown attributes are ignored.
    pub fn parse_set_cookie(line: &str) -> Option<Self> {
        let mut parts = line.split(';');
        let (name, value) = parts.next()?.trim().split_once('=')?;
        let name = name.trim();
        if !is_token(name) {
            return None;
        }
        let mut cookie = Cookie::new(name, decode_value(value.trim()));

        for attr in parts {
            let attr = attr.trim();
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr, ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "path" => cookie.path = Some(val.to_string()),
                "domain" => cookie.domain = Some(val.trim_start_matches('.').to_string()),
                "max-age" => cookie.max_age = val.parse().ok(),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "samesite" => cookie.same_site = SameSite::parse(val),
                _ => {}
            }
        }
        Some(cookie)
    }
}

impl fmt::Display for Cookie {
    /// The `name=value` pair as it appears in a `Cookie` request header.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, encode_value(&self.value))
    }
}

/// Append `cookie` to `headers` as a `Set-Cookie` header.
pub fn set_cookie(headers: &mut HeaderMap, cookie: &Cookie) -> Result<()> {
    let line = cookie.to_set_cookie()?;
    headers.add("Set-Cookie", line);
    Ok(())
}

/// Every well-formed cookie in the `Set-Cookie` headers.
pub fn read_set_cookies(headers: &HeaderMap) -> Vec<Cookie> {
    headers
        .values("Set-Cookie")
        .iter()
        .filter_map(|line| Cookie::parse_set_cookie(line))
        .collect()
}

/// Cookies from the `Cookie` headers, optionally only those named `filter`.
pub fn read_cookies(headers: &HeaderMap, filter: Option<&str>) -> Vec<Cookie> {
    headers
        .values("Cookie")
        .iter()
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if !is_token(name) || filter.is_some_and(|f| f != name) {
                return None;
            }
            Some(Cookie::new(name, decode_value(value.trim())))
        })
        .collect()
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument("cookie name is empty"));
    }
    if !is_token(name) {
        return Err(Error::invalid_argument(format!("invalid cookie name {name:?}")));
    }
    Ok(())
}

fn validate_attr(attr: &str, value: &str) -> Result<()> {
    if value.bytes().any(|b| b == b';' || b.is_ascii_control()) {
        return Err(Error::invalid_argument(format!("invalid cookie {attr} {value:?}")));
    }
    Ok(())
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

// cookie-octet per RFC 6265, minus '%' which introduces an escape.
fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x24 | 0x26..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}

fn encode_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if is_cookie_octet(b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

fn decode_value(raw: &str) -> String {
    let raw = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw);
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex(bytes[i + 1]), hex(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn hex(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_with_separator_round_trips() {
        let mut headers = HeaderMap::new();
        let cookie = Cookie::new("a", "b;c").with_path("/").secure();
        set_cookie(&mut headers, &cookie).unwrap();

        let parsed = read_set_cookies(&headers);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "a");
        assert_eq!(parsed[0].value, "b;c");
        assert_eq!(parsed[0], cookie);
    }

    #[test]
    fn awkward_values_round_trip() {
        for value in ["", "plain", "with space", "quote\"d", "100%", "comma,sep", "back\\slash", "ünï"] {
            let cookie = Cookie::new("k", value);
            let line = cookie.to_set_cookie().unwrap();
            let parsed = Cookie::parse_set_cookie(&line).unwrap();
            assert_eq!(parsed.value, value, "line was {line:?}");
        }
    }

    #[test]
    fn attribute_order() {
        let cookie = Cookie::new("session", "xyz")
            .with_path("/app")
            .with_domain("example.com")
            .with_max_age(3600)
            .secure()
            .http_only()
            .with_same_site(SameSite::Lax);
        assert_eq!(
            cookie.to_set_cookie().unwrap(),
            "session=xyz; Path=/app; Domain=example.com; Max-Age=3600; Secure; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn negative_max_age_expires() {
        let cookie = Cookie::new("gone", "").with_max_age(-1);
        assert_eq!(cookie.to_set_cookie().unwrap(), "gone=; Max-Age=0");
    }

    #[test]
    fn empty_name_is_invalid() {
        let mut headers = HeaderMap::new();
        let err = set_cookie(&mut headers, &Cookie::new("", "v")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(headers.is_empty());
    }

    #[test]
    fn invalid_name_is_rejected() {
        assert!(Cookie::new("bad name", "v").to_set_cookie().is_err());
        assert!(Cookie::new("a", "v").with_path("/x;y").to_set_cookie().is_err());
    }

    #[test]
    fn request_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.add("Cookie", "a=1; b=two%3Bparts");
        headers.add("Cookie", "c=\"quoted\"");

        let all = read_cookies(&headers, None);
        let names: Vec<_> = all.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(all[1].value, "two;parts");
        assert_eq!(all[2].value, "quoted");

        let only_b = read_cookies(&headers, Some("b"));
        assert_eq!(only_b.len(), 1);
    }

    #[test]
    fn same_site_parsing_is_case_insensitive() {
        let cookie = Cookie::parse_set_cookie("x=1; samesite=strict; HTTPONLY").unwrap();
        assert_eq!(cookie.same_site, Some(SameSite::Strict));
        assert!(cookie.http_only);
    }
}
