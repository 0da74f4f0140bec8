//! Identifier normalization for cross-revision comparison.
//!
//! Storage keys, record ids and file names reach the client in several
//! shapes: URL-encoded or not, with a `#full`-style sub-record suffix, with
//! or without the `uploads/` prefix the uploader adds. The functions here
//! reduce them to a comparable form. None of them fail: the worst case is a
//! less-normalized string, which can only cause a missed match.
//!
//! ```rust
//! use metastream_core::normalize::{equalish, normalize};
//!
//! let key = normalize(Some(" uploads/1700000000-report%20v2.csv#full "));
//! assert_eq!(key, "uploads/1700000000-report v2.csv");
//! assert!(equalish(&key, "1700000000-report v2.csv"));
//! ```

/// Default prefix the uploader puts in front of every object key.
pub const UPLOAD_PREFIX: &str = "uploads/";

/// Normalize an identifier: trim, URL-decode, drop any `#...` suffix.
///
/// Absent or empty input yields `""`. A malformed escape sequence leaves
/// the text undecoded. The steps are repeated until the value stops
/// changing, so the result is a fixed point:
/// `normalize(Some(&normalize(x))) == normalize(x)`.
pub fn normalize(input: Option<&str>) -> String {
    let mut current = match input {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => return String::new(),
    };

    // Every step either shortens the string or leaves it alone.
    loop {
        let next = normalize_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

/// [`normalize`], then strip a leading storage prefix case-insensitively.
///
/// `prefix` is treated as a path segment: a missing trailing `/` is added.
pub fn normalize_with_prefix(input: Option<&str>, prefix: &str) -> String {
    let normalized = normalize(input);
    let segment = if prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    };
    if segment == "/" {
        return normalized;
    }

    match normalized.get(..segment.len()) {
        Some(head) if head.eq_ignore_ascii_case(&segment) => {
            normalized[segment.len()..].to_string()
        }
        _ => normalized,
    }
}

/// Fuzzy identifier equality tolerant of a `/`-delimited path prefix.
///
/// `equalish("uploads/123-x.csv", "123-x.csv")` is true. Empty values never
/// match anything, including each other.
pub fn equalish(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    ends_with_segment(a, b) || ends_with_segment(b, a)
}

fn ends_with_segment(long: &str, tail: &str) -> bool {
    long.len() > tail.len()
        && long.ends_with(tail)
        && long.as_bytes()[long.len() - tail.len() - 1] == b'/'
}

fn normalize_once(s: &str) -> String {
    let trimmed = s.trim();
    let decoded = decode_component(trimmed);
    match decoded.find('#') {
        Some(idx) => decoded[..idx].to_string(),
        None => decoded,
    }
}

/// Percent-decode like `decodeURIComponent`: `+` is kept, and a bad escape
/// or invalid UTF-8 aborts decoding entirely.
fn decode_component(s: &str) -> String {
    if !s.contains('%') || has_malformed_escape(s) {
        return s.to_string();
    }
    match urlencoding::decode(s) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => s.to_string(),
    }
}

fn has_malformed_escape(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !ok {
                return true;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    false
}

/// Reduce an object reference to its bare key.
///
/// Accepts `s3://bucket/key`, path-style
/// `https://s3.<region>.amazonaws.com/<bucket>/<key>` and virtual-hosted
/// `https://<bucket>.s3.<region>.amazonaws.com/<key>` forms. Anything else
/// is returned trimmed, minus one leading `/`.
pub fn storage_key(input: &str) -> String {
    let k = input.trim();
    if k.is_empty() {
        return String::new();
    }

    if let Some(rest) = strip_prefix_ignore_case(k, "s3://") {
        if let Some((bucket, key)) = rest.split_once('/') {
            if !bucket.is_empty() && !key.is_empty() {
                return key.to_string();
            }
        }
    }

    let after_scheme = strip_prefix_ignore_case(k, "https://")
        .or_else(|| strip_prefix_ignore_case(k, "http://"));
    if let Some(rest) = after_scheme {
        let end = rest.find(&['?', '#'][..]).unwrap_or(rest.len());
        let rest = &rest[..end];
        let (host, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        let host = host.to_ascii_lowercase();

        if is_s3_endpoint(&host) {
            let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
            if parts.len() >= 2 {
                return parts[1..].join("/");
            }
        }
        let virtual_hosted = host
            .match_indices(".s3")
            .any(|(idx, _)| idx > 0 && is_s3_endpoint(&host[idx + 1..]));
        if virtual_hosted {
            return path.trim_start_matches('/').to_string();
        }
    }

    k.strip_prefix('/').unwrap_or(k).to_string()
}

/// Matches `s3[.-]<region>.amazonaws.com`.
fn is_s3_endpoint(host: &str) -> bool {
    let Some(rest) = host
        .strip_prefix("s3.")
        .or_else(|| host.strip_prefix("s3-"))
    else {
        return false;
    };
    let Some(region) = rest.strip_suffix(".amazonaws.com") else {
        return false;
    };
    !region.is_empty()
        && region
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&s[prefix.len()..]),
        _ => None,
    }
}
