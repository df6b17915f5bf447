use crate::error::EndpointError;
use reqwest::Url;
use std::fmt;

/// Path of the sensor's MJPEG resource
pub const STREAM_PATH: &str = "/stream";

/// Query parameter carrying the per-attempt cache-busting token
pub const CACHE_BUST_PARAM: &str = "t";

/// Network location of the live sensor stream.
///
/// Always holds an absolute `http`/`https` URL with a host, so it can be
/// loaded as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    url: Url,
}

impl StreamEndpoint {
    /// Build an endpoint from a complete locator such as the configured default
    pub fn from_url(raw: &str) -> Result<Self, EndpointError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EndpointError::Empty);
        }

        let mut url = parse_http_url(trimmed)?;
        if url.path().is_empty() || url.path() == "/" {
            url.set_path(STREAM_PATH);
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { url })
    }

    /// Normalize a manually typed address.
    ///
    /// Accepts a bare host (`192.168.1.50`), a host with port, or a full URL.
    /// Missing scheme becomes `http://`, a missing port becomes
    /// `service_port`, and the path is always the sensor's stream path.
    pub fn from_manual(raw: &str, service_port: u16) -> Result<Self, EndpointError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EndpointError::Empty);
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        let mut url = parse_http_url(&with_scheme)?;

        if explicit_port(&with_scheme).is_none() {
            url.set_port(Some(service_port))
                .map_err(|_| EndpointError::Invalid {
                    address: trimmed.to_string(),
                    details: "cannot carry a port".to_string(),
                })?;
        }

        url.set_path(STREAM_PATH);
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self { url })
    }

    /// The stable locator, without any cache-busting token
    pub fn locator(&self) -> &Url {
        &self.url
    }

    /// Locator for one load attempt, tagged so no cached response is reused
    pub fn locator_for_attempt(&self, attempt: u64, epoch_millis: i64) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair(
            CACHE_BUST_PARAM,
            &format!("{}-{}", epoch_millis, attempt),
        );
        url
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

impl fmt::Display for StreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

fn parse_http_url(raw: &str) -> Result<Url, EndpointError> {
    let url = Url::parse(raw).map_err(|e| EndpointError::Invalid {
        address: raw.to_string(),
        details: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(EndpointError::UnsupportedScheme {
                scheme: other.to_string(),
            })
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(EndpointError::Invalid {
            address: raw.to_string(),
            details: "missing host".to_string(),
        });
    }

    if url.port() == Some(0) {
        return Err(EndpointError::Invalid {
            address: raw.to_string(),
            details: "port 0 cannot be connected to".to_string(),
        });
    }

    Ok(url)
}

/// Port written in the authority section, if the user typed one.
///
/// `Url::port` hides ports equal to the scheme default, which would make an
/// explicit `:80` look absent.
fn explicit_port(raw: &str) -> Option<u16> {
    let after_scheme = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let authority = after_scheme
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let host_port = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);

    let port_part = if host_port.starts_with('[') {
        host_port.split_once("]:").map(|(_, port)| port)
    } else {
        host_port.rsplit_once(':').map(|(_, port)| port)
    }?;

    port_part.parse().ok()
}
