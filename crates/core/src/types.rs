use crate::error::{ToolhostError, ToolhostResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata snapshot a provider returns for a URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub name: String,
    pub uri: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ResourceInfo {
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            description: description.into(),
            mime_type: None,
            size: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A resource address of the form `<scheme>://<identifier>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceUri {
    scheme: String,
    identifier: String,
}

impl ResourceUri {
    pub fn parse(uri: &str) -> ToolhostResult<Self> {
        let (scheme, identifier) = uri
            .split_once("://")
            .ok_or_else(|| ToolhostError::unsupported_scheme(uri))?;

        let valid_scheme = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid_scheme {
            return Err(ToolhostError::unsupported_scheme(uri));
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            identifier: identifier.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl std::fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme, self.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        let uri = ResourceUri::parse("example://resource").unwrap();
        assert_eq!(uri.scheme(), "example");
        assert_eq!(uri.identifier(), "resource");
        assert_eq!(uri.to_string(), "example://resource");

        // Scheme is case-insensitive, identifier is kept verbatim
        let uri = ResourceUri::parse("FILE:///tmp/Notes.md").unwrap();
        assert_eq!(uri.scheme(), "file");
        assert_eq!(uri.identifier(), "/tmp/Notes.md");
    }

    #[test]
    fn test_parse_uri_rejects_missing_scheme() {
        for bad in ["resource", "://resource", "ex ample://x", ""] {
            let err = ResourceUri::parse(bad).unwrap_err();
            assert!(
                matches!(err, ToolhostError::ResourceNotFound(_)),
                "{bad:?} should be not found"
            );
        }
    }

    #[test]
    fn test_resource_info_serialization() {
        let info = ResourceInfo::new("Example", "example://resource", "An example")
            .with_mime_type("text/plain")
            .with_metadata("source", "memory");

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["mime_type"], "text/plain");
        assert_eq!(json["metadata"]["source"], "memory");
        assert!(json.get("size").is_none());
    }
}
