use std::fmt;

use url::Url;

use crate::{Error, Result};

/// Validated address of the backend service. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    uri: String,
}

impl ServiceEndpoint {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = |reason: String| Error::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason,
        };

        let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        // The channel is plaintext HTTP/2; tonic is built without TLS
        match url.scheme() {
            "http" => {}
            "https" => return Err(invalid("TLS endpoints are not supported, use http://".to_string())),
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        if url.path() != "/" {
            return Err(invalid("endpoint must not carry a path".to_string()));
        }

        Ok(Self {
            uri: raw.trim_end_matches('/').to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Fully qualified name of a server-streaming call, `package.Service/Method`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallPath {
    service: String,
    method: String,
}

impl CallPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_start_matches('/');
        let (service, method) = trimmed
            .split_once('/')
            .ok_or_else(|| Error::InvalidCallPath(raw.to_string()))?;

        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
        };
        if !valid(service) || !valid(method) || method.contains('.') {
            return Err(Error::InvalidCallPath(raw.to_string()));
        }

        Ok(Self {
            service: service.to_string(),
            method: method.to_string(),
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// HTTP/2 path the call is issued on
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }
}

impl fmt::Display for CallPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.method)
    }
}
