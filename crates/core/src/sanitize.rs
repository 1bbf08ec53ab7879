//! Helpers for embedding untrusted site URLs in prompts and survey questions.

use url::Url;

/// Domains known to present a valid certificate (green lock) everywhere.
const GREEN_LOCK_DOMAINS: &[&str] = &[
    "facebook.com",
    "mail.ru",
    "pinterest.com",
    "baidu.com",
    "ask.com",
    "stackoverflow.com",
    "twitter.com",
    "linkedin.com",
    "live.com",
    "bing.com",
    "tumblr.com",
    "imgur.com",
    "instagram.com",
    "wordpress.com",
    "yahoo.com",
    "wikipedia.org",
    "wikimedia.org",
    "paypal.com",
    "vk.com",
];

/// Sections of green-lock domains that serve mixed content.
const MIXED_CONTENT_PREFIXES: &[&str] = &["https://images.google.com", "https://www.bing.com/images"];

/// Reduce an untrusted URL to a bare host safe to use as a query parameter.
///
/// `http://` and `https://` are stripped; any other scheme yields an empty
/// string. The path is dropped and every character except ASCII word
/// characters and `.` is removed.
pub fn sanitize_url(url: &str) -> String {
    let rest = if let Some(rest) = url.strip_prefix("http://") {
        rest
    } else if let Some(rest) = url.strip_prefix("https://") {
        rest
    } else if url.contains("://") {
        return String::new();
    } else {
        url
    };

    let host = rest.split('/').next().unwrap_or_default();
    host.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect()
}

/// Shorten a URL for display: host (and non-default port) only.
///
/// The scheme is kept for anything other than HTTP(S). Input without a scheme
/// is read as `http://`. Unparseable input yields an empty string.
pub fn minimal_url(input: &str) -> String {
    let Some(url) = parse_lenient(input) else {
        return String::new();
    };
    let Some(host) = url.host_str() else {
        return String::new();
    };

    let host_port = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    match url.scheme() {
        "http" | "https" => host_port,
        scheme => format!("{scheme}://{host_port}"),
    }
}

/// Whether `url` belongs to a well-known site that always shows a green lock.
pub fn is_green_lock_site(url: &str) -> bool {
    let Some(parsed) = parse_lenient(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();

    let listed = is_google_host(&host)
        || GREEN_LOCK_DOMAINS
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")));
    if !listed {
        return false;
    }

    !MIXED_CONTENT_PREFIXES.iter().any(|p| url.starts_with(p))
}

/// `google.<suffix>` or any subdomain of it, where the suffix is a single
/// label (`google.com`, `google.de`) or `co`/`com` plus a two-letter country
/// code (`google.co.uk`, `google.com.au`).
fn is_google_host(host: &str) -> bool {
    let labels: Vec<&str> = host.split('.').collect();
    let Some(at) = labels.iter().rposition(|label| *label == "google") else {
        return false;
    };
    match &labels[at + 1..] {
        [tld] => !tld.is_empty(),
        [second, cc] => matches!(*second, "co" | "com") && cc.len() == 2,
        _ => false,
    }
}

fn parse_lenient(input: &str) -> Option<Url> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if input.contains("://") {
        Url::parse(input).ok()
    } else {
        Url::parse(&format!("http://{input}")).ok()
    }
}
