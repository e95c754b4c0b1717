//! Endpoint URL grammar
//!
//! A destination is an opaque URL whose scheme selects the transport
//! family. The full grammar:
//!
//! | Scheme | Family | TLS |
//! |--------|--------|-----|
//! | `syslog+tcp://host:port` | syslog over TCP | no |
//! | `syslog+tls://host:port` | syslog over TCP/TLS | yes |
//! | `syslog://`, `syslog+udp://` | syslog over UDP | no |
//! | `syslog+http://`, `http://` | application/syslog POST | no |
//! | `syslog+https://`, `https://` | application/syslog POST | yes |
//! | `elasticsearch+http://`, `es+http://` | bulk index API | no |
//! | `elasticsearch[+https]://`, `es[+https]://` | bulk index API | yes |
//!
//! Query options carry transport-specific settings; the bulk-index
//! family recognizes `index=<name>` and `auth=basic|bearer|apikey`.
//! Scheme matching is case-insensitive.

use url::Url;

use crate::error::EndpointError;

/// Transport family selected by an endpoint scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// One TCP socket per connection, octet-counted framing.
    SyslogTcp,
    /// One TLS-wrapped TCP socket per connection.
    SyslogTls,
    /// Connectionless datagrams, one per record.
    SyslogUdp,
    /// Batched `application/syslog` POST bodies.
    SyslogHttp,
    /// Batched bulk-index POST bodies.
    SearchIndex,
}

impl TransportKind {
    /// Whether the family multiplexes sends internally, in which case a
    /// drain never opens more than one connection to it.
    pub fn pools(self) -> bool {
        matches!(self, Self::SyslogHttp | Self::SearchIndex)
    }
}

/// Authorization flavor for the bulk-index family, from the `auth=`
/// query option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// `Authorization: Basic base64(user:pass)` (the default).
    #[default]
    Basic,
    /// `Authorization: Bearer <password>`; the username is ignored.
    Bearer,
    /// `Authorization: ApiKey base64(user:pass)`.
    ApiKey,
}

/// Scheme table: exact scheme -> (family, tls).
const SCHEMES: &[(&str, TransportKind, bool)] = &[
    ("syslog+tcp", TransportKind::SyslogTcp, false),
    ("syslog+tls", TransportKind::SyslogTls, true),
    ("syslog", TransportKind::SyslogUdp, false),
    ("syslog+udp", TransportKind::SyslogUdp, false),
    ("syslog+http", TransportKind::SyslogHttp, false),
    ("syslog+https", TransportKind::SyslogHttp, true),
    ("http", TransportKind::SyslogHttp, false),
    ("https", TransportKind::SyslogHttp, true),
    ("elasticsearch", TransportKind::SearchIndex, true),
    ("elasticsearch+http", TransportKind::SearchIndex, false),
    ("elasticsearch+https", TransportKind::SearchIndex, true),
    ("es", TransportKind::SearchIndex, true),
    ("es+http", TransportKind::SearchIndex, false),
    ("es+https", TransportKind::SearchIndex, true),
];

/// A validated destination endpoint.
///
/// Parsing resolves the scheme against the table above and keeps the
/// parsed URL around for host/credential/query access; it performs no
/// network I/O.
#[derive(Debug, Clone)]
pub struct Endpoint {
    raw: String,
    kind: TransportKind,
    tls: bool,
    url: Url,
}

impl Endpoint {
    /// Parse and validate an endpoint URL.
    pub fn parse(raw: &str) -> Result<Self, EndpointError> {
        let scheme = match raw.split_once("://") {
            Some((scheme, _)) => scheme.to_ascii_lowercase(),
            None => return Err(EndpointError::Malformed(raw.to_string())),
        };

        let (kind, tls) = SCHEMES
            .iter()
            .find(|(s, _, _)| *s == scheme)
            .map(|&(_, kind, tls)| (kind, tls))
            .ok_or_else(|| EndpointError::UnknownScheme(scheme.clone()))?;

        let url = Url::parse(raw).map_err(|_| EndpointError::Malformed(raw.to_string()))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(EndpointError::Malformed(raw.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            kind,
            tls,
            url,
        })
    }

    /// Check a URL against the scheme table without constructing anything.
    pub fn is_known_scheme(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    /// The original endpoint string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Transport family.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Whether the wire is TLS-wrapped.
    pub fn tls(&self) -> bool {
        self.tls
    }

    /// Host name.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Explicit port, if any.
    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    /// `host:port` suitable for a socket dial.
    ///
    /// Fails when the URL carries no explicit port - the socket families
    /// have no defaults to fall back on.
    pub fn socket_addr(&self) -> Result<String, EndpointError> {
        let port = self
            .port()
            .ok_or_else(|| EndpointError::Malformed(format!("{}: missing port", self.raw)))?;
        Ok(format!("{}:{}", self.host(), port))
    }

    /// The endpoint rewritten as a plain `http`/`https` URL, credentials
    /// and query stripped. Used by the HTTP-bodied families.
    pub fn http_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        let mut out = format!("{}://{}", scheme, self.host());
        if let Some(port) = self.port() {
            out.push_str(&format!(":{}", port));
        }
        out.push_str(self.url.path());
        out
    }

    /// Username from the URL userinfo ("" when absent).
    pub fn username(&self) -> &str {
        self.url.username()
    }

    /// Password from the URL userinfo.
    pub fn password(&self) -> Option<&str> {
        self.url.password()
    }

    /// First value of a query option.
    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// The `index=` query option.
    pub fn index(&self) -> Option<String> {
        self.query("index")
    }

    /// The `auth=` query option, defaulting to basic.
    pub fn auth_mode(&self) -> AuthMode {
        match self
            .query("auth")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            Some("bearer") => AuthMode::Bearer,
            Some("apikey") => AuthMode::ApiKey,
            _ => AuthMode::Basic,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
#[path = "endpoint_test.rs"]
mod endpoint_test;
