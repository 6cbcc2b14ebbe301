//! Form and query-string codec
//!
//! Shared by every platform adapter:
//! - query-string parse/rebuild with null-valued pairs preserved
//! - single-pass application/x-www-form-urlencoded body decoding

use crate::{Error, Result};
use std::collections::HashMap;

/// Parameter multimap. A name maps to its values in first-seen order.
/// `None` records a value-less pair (`?flag`), distinct from `Some("")`
/// (`?flag=`).
pub type ParamMap = HashMap<String, Vec<Option<String>>>;

/// Character sets supported for body decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
}

impl Charset {
    /// Parse a charset label. Unknown labels are a parse error rather than
    /// silent mojibake.
    pub fn parse(label: &str) -> Result<Self> {
        match label.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "latin-1" | "latin1" => Ok(Charset::Latin1),
            other => Err(Error::Parse(format!("unsupported charset: {other}"))),
        }
    }

    /// Extract the charset parameter from a content type, defaulting to
    /// UTF-8 when absent.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self> {
        let Some(ct) = content_type else {
            return Ok(Charset::Utf8);
        };
        for param in ct.split(';').skip(1) {
            if let Some((name, value)) = param.split_once('=') {
                if name.trim().eq_ignore_ascii_case("charset") {
                    return Charset::parse(value);
                }
            }
        }
        Ok(Charset::Utf8)
    }

    /// Decode raw bytes to a string
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            Charset::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::Parse(format!("invalid utf-8 payload: {e}"))),
            Charset::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    /// Encode a string to raw bytes. Latin-1 replaces out-of-range
    /// characters with `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Charset::Utf8 => text.as_bytes().to_vec(),
            Charset::Latin1 => text
                .chars()
                .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
                .collect(),
        }
    }
}

/// Parse a query string into a parameter multimap.
///
/// Splits on `&`, then on the first `=`. Both name and value are
/// percent-decoded. A pair without `=` yields a `None` value.
pub fn parse_query_string(query: &str) -> Result<ParamMap> {
    let mut params = ParamMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (name, value) = match pair.split_once('=') {
            Some((n, v)) => (n, Some(v)),
            None => (pair, None),
        };
        let name = percent_decode(name, Charset::Utf8)?;
        let value = match value {
            Some(v) => Some(percent_decode(v, Charset::Utf8)?),
            None => None,
        };
        params.entry(name).or_default().push(value);
    }
    Ok(params)
}

/// Rebuild a query string from a parameter multimap.
///
/// Inverse of [`parse_query_string`]: `None` values omit the `=`, empty
/// strings keep it. Pair order across names is unspecified (the multiset
/// of pairs is what round-trips).
pub fn write_query_string(params: &ParamMap) -> String {
    let mut out = String::new();
    for (name, values) in params {
        for value in values {
            if !out.is_empty() {
                out.push('&');
            }
            out.push_str(&percent_encode(name));
            if let Some(v) = value {
                out.push('=');
                out.push_str(&percent_encode(v));
            }
        }
    }
    out
}

/// Decode a form-encoded body into an existing parameter multimap.
///
/// Single pass, byte by byte: pairs accumulate until `&`, the first `=`
/// splits name from value, and percent escapes are resolved with the given
/// charset. Repeated names append rather than overwrite.
pub fn decode_form_body(body: &[u8], charset: Charset, params: &mut ParamMap) -> Result<()> {
    let mut name = Vec::new();
    let mut value = Vec::new();
    let mut has_value = false;
    let mut i = 0;

    let mut flush = |name: &mut Vec<u8>, value: &mut Vec<u8>, has_value: &mut bool| -> Result<()> {
        if !name.is_empty() || *has_value {
            let n = charset.decode(name)?;
            let v = if *has_value {
                Some(charset.decode(value)?)
            } else {
                None
            };
            params.entry(n).or_default().push(v);
        }
        name.clear();
        value.clear();
        *has_value = false;
        Ok(())
    };

    while i < body.len() {
        let b = body[i];
        let decoded = match b {
            b'&' => {
                flush(&mut name, &mut value, &mut has_value)?;
                i += 1;
                continue;
            }
            b'=' if !has_value => {
                has_value = true;
                i += 1;
                continue;
            }
            b'+' => b' ',
            b'%' => {
                let byte = decode_escape(body, i)?;
                i += 2;
                byte
            }
            other => other,
        };
        if has_value {
            value.push(decoded);
        } else {
            name.push(decoded);
        }
        i += 1;
    }
    flush(&mut name, &mut value, &mut has_value)
}

/// Percent-decode one token
pub fn percent_decode(token: &str, charset: Charset) -> Result<String> {
    let bytes = token.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                out.push(decode_escape(bytes, i)?);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    charset.decode(&out)
}

/// Percent-encode one token (RFC 3986 unreserved characters pass through)
pub fn percent_encode(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for b in token.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*b as char)
            }
            other => {
                out.push('%');
                out.push_str(&format!("{other:02X}"));
            }
        }
    }
    out
}

/// Resolve the two hex digits following a `%` at position `at`
fn decode_escape(bytes: &[u8], at: usize) -> Result<u8> {
    let hex = bytes
        .get(at + 1..at + 3)
        .ok_or_else(|| Error::Parse("truncated percent escape".to_string()))?;
    let hex = std::str::from_utf8(hex)
        .map_err(|_| Error::Parse("invalid percent escape".to_string()))?;
    u8::from_str_radix(hex, 16).map_err(|_| Error::Parse(format!("invalid percent escape %{hex}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(params: &ParamMap, name: &str) -> Vec<Option<String>> {
        params.get(name).cloned().unwrap_or_default()
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("foo=bar&baz=qux%20quux&foo=second").unwrap();
        assert_eq!(
            values(&params, "foo"),
            vec![Some("bar".to_string()), Some("second".to_string())]
        );
        assert_eq!(values(&params, "baz"), vec![Some("qux quux".to_string())]);
    }

    #[test]
    fn test_valueless_pair_is_null_not_empty() {
        let params = parse_query_string("flag&empty=").unwrap();
        assert_eq!(values(&params, "flag"), vec![None]);
        assert_eq!(values(&params, "empty"), vec![Some(String::new())]);
    }

    #[test]
    fn test_write_query_string_inverse() {
        let qs = "flag&empty=&name=va%26lue";
        let parsed = parse_query_string(qs).unwrap();
        let rebuilt = write_query_string(&parsed);

        // Literal ordering may change; the multiset of pairs must not.
        assert_eq!(parse_query_string(&rebuilt).unwrap(), parsed);
        assert!(rebuilt.contains("empty="));
        assert!(!rebuilt.contains("flag="));
    }

    #[test]
    fn test_normalized_round_trip() {
        for qs in ["a=1&b=2&a=3", "x=%7B%7D", "just-a-name", "a=&b"] {
            let once = parse_query_string(qs).unwrap();
            let again = parse_query_string(&write_query_string(&once)).unwrap();
            assert_eq!(once, again, "round trip changed {qs}");
        }
    }

    #[test]
    fn test_bad_escape_is_parse_error() {
        assert!(matches!(
            parse_query_string("a=%zz"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(parse_query_string("a=%2"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_decode_form_body_appends() {
        let mut params = ParamMap::new();
        params
            .entry("A".to_string())
            .or_default()
            .push(Some("alpha".to_string()));

        decode_form_body(b"B=bravo&A=again", Charset::Utf8, &mut params).unwrap();

        assert_eq!(values(&params, "B"), vec![Some("bravo".to_string())]);
        assert_eq!(
            values(&params, "A"),
            vec![Some("alpha".to_string()), Some("again".to_string())]
        );
    }

    #[test]
    fn test_decode_form_body_latin1() {
        let mut params = ParamMap::new();
        decode_form_body(b"name=%E9clair", Charset::Latin1, &mut params).unwrap();
        assert_eq!(values(&params, "name"), vec![Some("éclair".to_string())]);
    }

    #[test]
    fn test_charset_from_content_type() {
        let ct = Some("application/x-www-form-urlencoded; charset=ISO-8859-1");
        assert_eq!(Charset::from_content_type(ct).unwrap(), Charset::Latin1);
        assert_eq!(Charset::from_content_type(None).unwrap(), Charset::Utf8);
        assert!(Charset::from_content_type(Some("text/plain; charset=ebcdic")).is_err());
    }
}
