//! Turns captured header lines back into typed response parts.
//!
//! libcurl hands the response head to the header callback one raw line at
//! a time. The status line must parse or the whole transfer is rejected;
//! individual header lines that do not parse are silently dropped.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{StatusCode, Version};

/// Typed head of a response: everything except the body.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
}

/// Parses one captured head block. The first line must be a status line;
/// the rest are header lines.
pub(crate) fn parse_head(lines: &[Vec<u8>]) -> Result<ResponseHead, String> {
    let status_line = lines
        .first()
        .ok_or_else(|| "no status line captured".to_string())?;
    let (version, status) = parse_status_line(status_line).ok_or_else(|| {
        format!(
            "unparseable status line: {:?}",
            String::from_utf8_lossy(trim_crlf(status_line))
        )
    })?;

    let mut headers = HeaderMap::new();
    for line in &lines[1..] {
        if trim_crlf(line).is_empty() {
            continue;
        }
        if let Some((name, value)) = parse_header_line(line) {
            headers.append(name, value);
        }
    }

    Ok(ResponseHead {
        version,
        status,
        headers,
    })
}

/// Parses `HTTP/<version> <status> [reason]`. The reason phrase is
/// optional and ignored.
fn parse_status_line(line: &[u8]) -> Option<(Version, StatusCode)> {
    let text = std::str::from_utf8(trim_crlf(line)).ok()?;
    let mut parts = text.splitn(3, ' ');

    let version = match parts.next()? {
        "HTTP/0.9" => Version::HTTP_09,
        "HTTP/1.0" => Version::HTTP_10,
        "HTTP/1.1" => Version::HTTP_11,
        "HTTP/2" | "HTTP/2.0" => Version::HTTP_2,
        "HTTP/3" | "HTTP/3.0" => Version::HTTP_3,
        _ => return None,
    };

    let status = parts.next()?.parse::<u16>().ok()?;
    let status = StatusCode::from_u16(status).ok()?;
    Some((version, status))
}

/// Parses a `Name: Value` line. Returns `None` for anything malformed:
/// no colon, empty or non-token name. Surrounding whitespace on the
/// value is trimmed; its bytes are kept verbatim otherwise.
fn parse_header_line(line: &[u8]) -> Option<(HeaderName, HeaderValue)> {
    let line = trim_crlf(line);
    let colon = memchr::memchr(b':', line)?;
    if colon == 0 {
        return None;
    }

    let name = HeaderName::from_bytes(&line[..colon]).ok()?;

    let mut value = &line[colon + 1..];
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = value {
        value = rest;
    }

    let value = HeaderValue::from_bytes(value).ok()?;
    Some((name, value))
}

pub(crate) fn trim_crlf(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\r' || line[end - 1] == b'\n') {
        end -= 1;
    }
    &line[..end]
}
