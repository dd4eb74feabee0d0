//! Connector transport derived from the manifest endpoint URL.

use super::ToolRegistryDomainError;
use serde::{Deserialize, Serialize};

/// Transport settings for a connector hosted as a local process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdioTransportConfig {
    command: String,
    args: Vec<String>,
}

impl StdioTransportConfig {
    /// Parses `command arg1 arg2` as written after the `stdio:` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyStdioCommand`] when no command
    /// is present.
    pub fn parse(command_line: &str) -> Result<Self, ToolRegistryDomainError> {
        let mut parts = command_line.split_whitespace().map(str::to_owned);
        let command = parts
            .next()
            .ok_or(ToolRegistryDomainError::EmptyStdioCommand)?;
        Ok(Self {
            command,
            args: parts.collect(),
        })
    }

    /// Returns the executable command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Transport settings for a connector hosted over HTTP+SSE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSseTransportConfig {
    base_url: String,
}

impl HttpSseTransportConfig {
    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Supported connector transport variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum ConnectorTransport {
    /// Connector over local process STDIO.
    Stdio(StdioTransportConfig),
    /// Connector over HTTP+SSE.
    HttpSse(HttpSseTransportConfig),
}

impl ConnectorTransport {
    /// Derives the transport from a manifest endpoint URL.
    ///
    /// `http://` and `https://` endpoints use HTTP+SSE; `stdio:<command>`
    /// endpoints launch a local process.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] for empty endpoints, unknown
    /// schemes, or empty STDIO commands.
    pub fn from_endpoint(endpoint_url: &str) -> Result<Self, ToolRegistryDomainError> {
        let trimmed = endpoint_url.trim();
        if trimmed.is_empty() {
            return Err(ToolRegistryDomainError::EmptyEndpointUrl);
        }

        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(Self::HttpSse(HttpSseTransportConfig {
                base_url: trimmed.to_owned(),
            }));
        }

        if let Some(rest) = trimmed.strip_prefix("stdio:") {
            let command_line = rest.trim_start_matches("//");
            return Ok(Self::Stdio(StdioTransportConfig::parse(command_line)?));
        }

        Err(ToolRegistryDomainError::UnsupportedEndpointScheme(
            trimmed.to_owned(),
        ))
    }

    /// Returns the canonical storage representation of the transport kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Stdio(_) => "stdio",
            Self::HttpSse(_) => "http_sse",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://github.example/mcp", "http_sse")]
    #[case("http://localhost:9000", "http_sse")]
    #[case("stdio:mcp-fs --root /srv", "stdio")]
    #[case("stdio://mcp-fs", "stdio")]
    fn derives_transport_kind(#[case] endpoint: &str, #[case] kind: &str) {
        let transport = ConnectorTransport::from_endpoint(endpoint).expect("endpoint is valid");
        assert_eq!(transport.kind(), kind);
    }

    #[test]
    fn stdio_arguments_are_split() {
        let transport =
            ConnectorTransport::from_endpoint("stdio:mcp-fs --root /srv").expect("valid endpoint");
        let ConnectorTransport::Stdio(config) = transport else {
            panic!("expected stdio transport");
        };
        assert_eq!(config.command(), "mcp-fs");
        assert_eq!(config.args(), ["--root", "/srv"]);
    }

    #[rstest]
    #[case("", ToolRegistryDomainError::EmptyEndpointUrl)]
    #[case("stdio:   ", ToolRegistryDomainError::EmptyStdioCommand)]
    #[case(
        "ftp://files.example",
        ToolRegistryDomainError::UnsupportedEndpointScheme("ftp://files.example".to_owned())
    )]
    fn rejects_invalid_endpoints(#[case] endpoint: &str, #[case] expected: ToolRegistryDomainError) {
        assert_eq!(ConnectorTransport::from_endpoint(endpoint), Err(expected));
    }
}
