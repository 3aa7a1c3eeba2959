//! Static allow-list of image hosts the proxy will fetch from

use reqwest::Url;

/// Hosts (and their subdomains) images may be proxied from
pub const ALLOWED_DOMAINS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "firebasestorage.googleapis.com",
    "storage.googleapis.com",
    "lh3.googleusercontent.com",
    "images.unsplash.com",
];

/// Exact match, or a subdomain of an allowed domain
pub fn is_allowed_host(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    ALLOWED_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Only http(s) URLs are proxied at all
pub fn is_proxyable(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Parsed target passes the scheme check and the allow-list
pub fn is_allowed(url: &Url) -> bool {
    is_proxyable(url) && url.host_str().is_some_and(is_allowed_host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(raw: &str) -> bool {
        is_allowed(&Url::parse(raw).unwrap())
    }

    #[test]
    fn test_exact_domains_are_allowed() {
        assert!(allowed("https://localhost/test.jpg"));
        assert!(allowed("http://127.0.0.1:8080/a.png"));
        assert!(allowed("https://images.unsplash.com/photo-1"));
    }

    #[test]
    fn test_subdomains_are_allowed() {
        assert!(allowed("https://cdn.images.unsplash.com/x.jpg"));
        assert!(is_allowed_host("Bucket.Storage.GoogleAPIs.com"));
    }

    #[test]
    fn test_lookalike_domains_are_rejected() {
        assert!(!allowed("https://evil-domain.com/x.jpg"));
        assert!(!allowed("https://evilimages.unsplash.com.attacker.net/x.jpg"));
        assert!(!allowed("https://notlocalhost/x.jpg"));
    }

    #[test]
    fn test_non_http_schemes_are_rejected() {
        assert!(!allowed("file:///etc/passwd"));
        assert!(!allowed("ftp://localhost/x.jpg"));
    }
}
