//! Covered components and canonical signature base construction.
//!
//! Signer and verifier both go through [`canonical_base`], so the same inputs
//! always produce byte-identical bases.

use std::{fmt::Display, str::FromStr};

use http::{HeaderMap, HeaderName, Method};
use url::{Position, Url};

use crate::signature::params::{ParamsError, SignatureParameters};

/// A request facet that a signature may cover.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Component {
    /// `@method`: the request method, e.g. `GET`.
    Method,
    /// `@target-uri`: the full absolute request URL.
    TargetUri,
    /// `@authority`: host, plus port when it is not the scheme default.
    Authority,
    /// `@scheme`: lower-case URL scheme.
    Scheme,
    /// `@request-target`: path and query.
    RequestTarget,
    /// `@path`: absolute path only.
    Path,
    /// `@query`: `?` followed by the query, or a lone `?`.
    Query,
    /// `created`: the signature's own creation timestamp.
    Created,
    /// A request header, by lower-case name.
    Header(HeaderName),
}

impl Component {
    pub fn name(&self) -> &str {
        match self {
            Component::Method => "@method",
            Component::TargetUri => "@target-uri",
            Component::Authority => "@authority",
            Component::Scheme => "@scheme",
            Component::RequestTarget => "@request-target",
            Component::Path => "@path",
            Component::Query => "@query",
            Component::Created => "created",
            Component::Header(name) => name.as_str(),
        }
    }
}

impl Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Component {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let component = match s {
            "@method" => Component::Method,
            "@target-uri" => Component::TargetUri,
            "@authority" => Component::Authority,
            "@scheme" => Component::Scheme,
            "@request-target" => Component::RequestTarget,
            "@path" => Component::Path,
            "@query" => Component::Query,
            "created" => Component::Created,
            // Header names must already be lower-case so both sides print the same line
            name if !name.starts_with('@') && !name.bytes().any(|b| b.is_ascii_uppercase()) => {
                HeaderName::from_bytes(name.as_bytes())
                    .map(Component::Header)
                    .map_err(|_| ParamsError::InvalidComponent(name.to_string()))?
            }
            other => return Err(ParamsError::InvalidComponent(other.to_string())),
        };
        Ok(component)
    }
}

/// The fixed component order used by the composer, before any headers.
pub const DEFAULT_COMPONENTS: [Component; 6] = [
    Component::Method,
    Component::TargetUri,
    Component::Authority,
    Component::Scheme,
    Component::RequestTarget,
    Component::Created,
];

/// A covered component could not be read from the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComponentError {
    #[error("URL has no host")]
    MissingHost,
    #[error("Covered header '{0}' is not present")]
    MissingHeader(String),
    #[error("Covered header '{0}' is not visible ASCII")]
    InvalidHeader(String),
}

/// The parts of a request that components are read from.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub headers: &'a HeaderMap,
}

impl<'a> RequestView<'a> {
    pub fn new(method: &'a Method, url: &'a Url, headers: &'a HeaderMap) -> Self {
        RequestView {
            method,
            url,
            headers,
        }
    }
}

/// `@authority` for a URL.
///
/// The port is kept only when it is explicit and differs from the scheme's
/// default, so `https://a.example:443/` and `https://a.example/` agree.
pub fn authority(url: &Url) -> Result<String, ComponentError> {
    let host = url.host_str().ok_or(ComponentError::MissingHost)?;
    let host = host.to_ascii_lowercase();
    // `Url::port` is already `None` for the scheme default
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

fn header_value(headers: &HeaderMap, name: &HeaderName) -> Result<String, ComponentError> {
    let mut values = headers.get_all(name).iter().peekable();
    if values.peek().is_none() {
        return Err(ComponentError::MissingHeader(name.to_string()));
    }

    let mut joined = Vec::new();
    for value in values {
        let value = value
            .to_str()
            .map_err(|_| ComponentError::InvalidHeader(name.to_string()))?;
        joined.push(value.trim());
    }
    Ok(joined.join(", "))
}

/// The canonical value of one component.
pub fn component_value(
    component: &Component,
    request: &RequestView<'_>,
    created: u64,
) -> Result<String, ComponentError> {
    let url = request.url;
    Ok(match component {
        Component::Method => request.method.as_str().to_string(),
        // Fragments never reach the server
        Component::TargetUri => url[..Position::AfterQuery].to_string(),
        Component::Authority => authority(url)?,
        Component::Scheme => url.scheme().to_ascii_lowercase(),
        Component::RequestTarget => url[Position::BeforePath..Position::AfterQuery].to_string(),
        Component::Path => url.path().to_string(),
        Component::Query => format!("?{}", url.query().unwrap_or_default()),
        Component::Created => created.to_string(),
        Component::Header(name) => header_value(request.headers, name)?,
    })
}

/// Build the signature base for `params` over `request`.
///
/// `signature_params` is the serialized parameter list the final
/// `"@signature-params"` line binds to. The composer passes its own
/// serialization; the verifier passes the declaration exactly as received.
pub fn canonical_base(
    request: &RequestView<'_>,
    params: &SignatureParameters,
    signature_params: &str,
) -> Result<String, ComponentError> {
    let mut lines = Vec::with_capacity(params.components.len() + 1);
    for component in &params.components {
        let value = component_value(component, request, params.created)?;
        lines.push(format!("\"{}\": {}", component.name(), value));
    }
    lines.push(format!("\"@signature-params\": {signature_params}"));
    Ok(lines.join("\n"))
}
