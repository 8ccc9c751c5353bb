use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
///
/// These errors cover both parsing failures and security policy violations
/// designed to prevent SSRF (Server-Side Request Forgery) through feed URLs.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Which upstream URLs the proxy is willing to request.
///
/// Only `http` and `https` are ever allowed. Unless `allow_private` is set,
/// localhost and private, link-local or unspecified addresses are rejected too.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlPolicy {
    pub allow_private: bool,
}

impl UrlPolicy {
    pub fn new(allow_private: bool) -> Self {
        Self { allow_private }
    }

    /// Parses `url_str` and checks it against this policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use feedfilter::util::UrlPolicy;
    ///
    /// let strict = UrlPolicy::new(false);
    /// assert!(strict.validate("https://example.com/feed.xml").is_ok());
    /// assert!(strict.validate("http://192.168.1.1/feed").is_err());
    /// assert!(strict.validate("file:///etc/passwd").is_err());
    ///
    /// assert!(UrlPolicy::new(true).validate("http://127.0.0.1:8080/feed").is_ok());
    /// ```
    pub fn validate(&self, url_str: &str) -> Result<Url, UrlValidationError> {
        let url = Url::parse(url_str)?;
        self.check(&url)?;
        Ok(url)
    }

    /// Checks an already parsed URL, e.g. a redirect target.
    pub fn check(&self, url: &Url) -> Result<(), UrlValidationError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
        }
        if self.allow_private {
            return Ok(());
        }

        if let Some(host) = url.host_str() {
            if host.eq_ignore_ascii_case("localhost") {
                return Err(UrlValidationError::Localhost);
            }

            // Strip brackets from IPv6 addresses for parsing
            let host_for_parse = host
                .strip_prefix('[')
                .and_then(|h| h.strip_suffix(']'))
                .unwrap_or(host);

            if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
                if ip.is_loopback() {
                    return Err(UrlValidationError::Localhost);
                }
                if is_private_ip(&ip) {
                    return Err(UrlValidationError::PrivateIp(ip.to_string()));
                }
            }
        }
        Ok(())
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            if let Some(mapped) = ipv6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> UrlPolicy {
        UrlPolicy::new(false)
    }

    #[test]
    fn test_valid_urls() {
        assert!(strict().validate("https://example.com/feed.xml").is_ok());
        assert!(strict().validate("http://news.example.org").is_ok());
        assert!(strict().validate("https://example.com:443/feed.xml").is_ok());
    }

    #[test]
    fn test_invalid_schemes_rejected_even_when_private_allowed() {
        for policy in [strict(), UrlPolicy::new(true)] {
            assert!(matches!(
                policy.validate("file:///etc/passwd"),
                Err(UrlValidationError::UnsupportedScheme(s)) if s == "file"
            ));
            assert!(policy.validate("ftp://example.com").is_err());
        }
    }

    #[test]
    fn test_unparseable_url() {
        assert!(matches!(
            strict().validate("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_localhost_rejected() {
        assert!(matches!(
            strict().validate("http://localhost/feed"),
            Err(UrlValidationError::Localhost)
        ));
        assert!(strict().validate("http://127.0.0.1/feed").is_err());
        assert!(strict().validate("http://[::1]/feed").is_err());
    }

    #[test]
    fn test_private_ips_rejected() {
        assert!(strict().validate("http://192.168.1.1/feed").is_err());
        assert!(strict().validate("http://10.0.0.1:3000/feed").is_err());
        assert!(strict().validate("http://172.16.0.1/feed").is_err());
        assert!(strict().validate("http://169.254.1.1/feed").is_err());
        assert!(strict().validate("http://[fe80::1]/feed").is_err());
        assert!(strict().validate("http://[::ffff:192.168.1.1]/feed").is_err());
        assert!(strict().validate("http://0.0.0.0/feed").is_err());
    }

    #[test]
    fn test_private_allowed_when_configured() {
        let permissive = UrlPolicy::new(true);
        assert!(permissive.validate("http://localhost:8080/feed").is_ok());
        assert!(permissive.validate("http://10.0.0.1/feed").is_ok());
    }

    #[test]
    fn test_check_parsed_redirect_target() {
        let target = Url::parse("https://example.com/moved").unwrap();
        assert!(strict().check(&target).is_ok());

        let target = Url::parse("gopher://example.com/").unwrap();
        assert!(strict().check(&target).is_err());
    }
}
