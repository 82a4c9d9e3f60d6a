//! URL canonicalization and decomposition.
//!
//! Two textually different URLs that name the same resource must hash
//! identically, so every lookup starts by normalizing the URL and then
//! enumerating the host-suffix/path-prefix expressions the service
//! indexes. Each expression is hashed with SHA-256; the database and cache
//! operate on those hashes.

use crate::error::{Error, Result};
use crate::hash::HashPrefix;
use rustc_hash::FxHashMap;
use std::fmt::Write;
use url::Host;

const MAX_HOST_LABELS: usize = 5;
const MAX_PATH_PREFIXES: usize = 4;

/// Computes the full-hash → canonical-pattern map for a URL: every
/// host-suffix × path-prefix expression that must be checked against the
/// blocklists.
pub fn generate_hashes(url: &str) -> Result<FxHashMap<HashPrefix, String>> {
    let parts = canonical_parts(url)?;
    let mut out = FxHashMap::default();
    for host in host_suffixes(&parts.host) {
        for path in path_prefixes(&parts.path, parts.query.as_deref()) {
            let pattern = format!("{host}{path}");
            out.insert(HashPrefix::full(&pattern), pattern);
        }
    }
    Ok(out)
}

/// Returns the canonical form of a URL. Canonicalization is idempotent.
pub fn canonical_url(url: &str) -> Result<String> {
    let parts = canonical_parts(url)?;
    let mut out = format!("{}://{}{}", parts.scheme, parts.host, parts.path);
    if let Some(q) = &parts.query {
        write!(out, "?{q}").unwrap();
    }
    Ok(out)
}

struct CanonicalParts {
    scheme: String,
    host: String,
    path: String,
    query: Option<String>,
}

fn canonical_parts(url: &str) -> Result<CanonicalParts> {
    // Strip whitespace that browsers ignore, then the fragment. The
    // fragment goes before unescaping so a decoded '#' stays in the path.
    let mut cleaned: Vec<u8> = url
        .trim()
        .bytes()
        .filter(|b| !matches!(b, b'\t' | b'\r' | b'\n'))
        .collect();
    if let Some(idx) = cleaned.iter().position(|&b| b == b'#') {
        cleaned.truncate(idx);
    }
    let cleaned = unescape(&cleaned);

    let (scheme, rest) = split_scheme(&cleaned);
    // The authority ends at the first '/' or '?' (a query may follow the
    // host directly, with no path).
    let cut = rest
        .iter()
        .position(|&b| b == b'/' || b == b'?')
        .unwrap_or(rest.len());
    let hostport = &rest[..cut];
    let path_query = &rest[cut..];
    let (raw_path, query) = match path_query.iter().position(|&b| b == b'?') {
        Some(idx) => (&path_query[..idx], Some(&path_query[idx + 1..])),
        None => (path_query, None),
    };

    // Userinfo is dropped; only the authority's host survives.
    let hostport = match hostport.iter().rposition(|&b| b == b'@') {
        Some(idx) => &hostport[idx + 1..],
        None => hostport,
    };

    let host = canonical_host(&String::from_utf8_lossy(hostport))?;
    let path = escape(resolve_path(&String::from_utf8_lossy(raw_path)).as_bytes());
    let query = query.map(escape);

    Ok(CanonicalParts {
        scheme,
        host,
        path,
        query,
    })
}

fn split_scheme(url: &[u8]) -> (String, &[u8]) {
    if let Some(idx) = url.windows(3).position(|w| w == b"://") {
        let scheme = &url[..idx];
        let valid = !scheme.is_empty()
            && scheme[0].is_ascii_alphabetic()
            && scheme
                .iter()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'));
        if valid {
            return (
                String::from_utf8_lossy(scheme).to_ascii_lowercase(),
                &url[idx + 3..],
            );
        }
    }
    ("http".to_string(), url)
}

/// Lowercases, strips the port and stray dots, punycodes IDN hosts, and
/// normalizes every numeric form (decimal, octal, hex, partial dotted) to
/// a dotted-quad IPv4 address.
fn canonical_host(raw: &str) -> Result<String> {
    let mut host = raw.trim().to_ascii_lowercase();
    host = strip_port(&host).to_string();

    if !host.starts_with('[') {
        // Collapse runs of dots and drop leading/trailing ones.
        let mut collapsed = String::with_capacity(host.len());
        for label in host.split('.').filter(|l| !l.is_empty()) {
            if !collapsed.is_empty() {
                collapsed.push('.');
            }
            collapsed.push_str(label);
        }
        host = collapsed;
    }

    if host.is_empty() {
        return Err(Error::InvalidUrl(format!("no host in {raw:?}")));
    }

    // The url crate's host parser handles IDNA mapping and the browser
    // rules for numeric IPv4 forms in one place.
    match Host::parse(&host) {
        Ok(Host::Domain(d)) => Ok(d),
        Ok(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Ok(Host::Ipv6(ip)) => Ok(format!("[{ip}]")),
        Err(e) => Err(Error::InvalidUrl(format!("bad host {host:?}: {e}"))),
    }
}

fn strip_port(host: &str) -> &str {
    if let Some(idx) = host.rfind(':') {
        let (h, port) = (&host[..idx], &host[idx + 1..]);
        let bare_ipv6 = !h.starts_with('[') && h.contains(':');
        if !bare_ipv6 && port.bytes().all(|b| b.is_ascii_digit()) {
            return h;
        }
    }
    host
}

/// Resolves `.`/`..` segments and collapses consecutive slashes. The
/// result always starts with `/`; a directory-style input keeps its
/// trailing slash.
fn resolve_path(path: &str) -> String {
    let trailing =
        path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..") || path.is_empty();
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let mut out = String::from("/");
    out.push_str(&segments.join("/"));
    if trailing && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Repeatedly percent-unescapes until no `%HH` sequences remain.
fn unescape(input: &[u8]) -> Vec<u8> {
    let mut cur = input.to_vec();
    loop {
        let (next, changed) = unescape_once(&cur);
        if !changed {
            return next;
        }
        cur = next;
    }
}

fn unescape_once(input: &[u8]) -> (Vec<u8>, bool) {
    let mut out = Vec::with_capacity(input.len());
    let mut changed = false;
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'%' && i + 2 < input.len() {
            let hi = (input[i + 1] as char).to_digit(16);
            let lo = (input[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                changed = true;
                i += 3;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }
    (out, changed)
}

/// Percent-escapes bytes outside printable ASCII plus `#`, `%`, and space,
/// uppercase hex.
fn escape(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input {
        if b < 0x20 || b >= 0x7f || matches!(b, b' ' | b'#' | b'%') {
            write!(out, "%{b:02X}").unwrap();
        } else {
            out.push(b as char);
        }
    }
    out
}

/// The exact host plus up to four suffixes formed by dropping leading
/// labels, never keeping more than the rightmost five. IP hosts produce
/// only the exact host.
fn host_suffixes(host: &str) -> Vec<String> {
    if host.starts_with('[') || host.parse::<std::net::Ipv4Addr>().is_ok() {
        return vec![host.to_string()];
    }
    let labels: Vec<&str> = host.split('.').collect();
    let mut out = vec![host.to_string()];
    for take in 2..=MAX_HOST_LABELS {
        if take < labels.len() {
            out.push(labels[labels.len() - take..].join("."));
        }
    }
    out
}

/// `/`, the directory prefixes from the root (at most four expressions
/// including `/`), the exact path, and the exact path with its query.
fn path_prefixes(path: &str, query: Option<&str>) -> Vec<String> {
    let mut out = vec![String::from("/")];
    let components: Vec<&str> = path.split('/').collect();
    let mut cur = String::from("/");
    for comp in components
        .iter()
        .skip(1)
        .take(components.len().saturating_sub(2))
    {
        if out.len() >= MAX_PATH_PREFIXES {
            break;
        }
        cur.push_str(comp);
        cur.push('/');
        if cur != path {
            out.push(cur.clone());
        }
    }
    if path != "/" {
        out.push(path.to_string());
    }
    if let Some(q) = query {
        out.push(format!("{path}?{q}"));
    }
    out
}
