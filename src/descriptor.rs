//! Connection descriptors for pluggable backends.
//!
//! A descriptor looks like `scheme://target?key=value&key2=value2`. The
//! scheme selects a provider from a registration table; the target and
//! parameters are interpreted by that provider.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DescriptorError {
    #[error("Descriptor '{0}' is missing a scheme (expected scheme://...)")]
    MissingScheme(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    params: Vec<(String, String)>,
    scheme: String,
    target: String,
}

impl Descriptor {
    pub fn parse(raw: &str) -> Result<Self, DescriptorError> {
        let raw = raw.trim();
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| DescriptorError::MissingScheme(raw.to_string()))?;

        if scheme.is_empty() {
            return Err(DescriptorError::MissingScheme(raw.to_string()));
        }

        let (target, query) = match rest.split_once('?') {
            Some((target, query)) => (target, query),
            None => (rest, ""),
        };

        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();

        Ok(Self {
            params,
            scheme: scheme.to_ascii_lowercase(),
            target: target.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Everything between `://` and the query string.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl FromStr for Descriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.target)?;
        for (i, (key, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scheme_and_target() {
        let d = Descriptor::parse("redb://./data").unwrap();
        assert_eq!(d.scheme(), "redb");
        assert_eq!(d.target(), "./data");

        let d = Descriptor::parse("redb:///var/lib/relay").unwrap();
        assert_eq!(d.target(), "/var/lib/relay");
    }

    #[test]
    fn test_parse_params() {
        let d = Descriptor::parse("MEM://relay?capacity=64&verbose").unwrap();
        assert_eq!(d.scheme(), "mem");
        assert_eq!(d.target(), "relay");
        assert_eq!(d.param("capacity"), Some("64"));
        assert_eq!(d.param("verbose"), Some(""));
        assert_eq!(d.param("missing"), None);
        assert_eq!(d.to_string(), "mem://relay?capacity=64&verbose=");
    }

    #[test]
    fn test_missing_scheme() {
        assert!(matches!(
            Descriptor::parse("relay"),
            Err(DescriptorError::MissingScheme(_))
        ));
        assert!(Descriptor::parse("://relay").is_err());
    }
}
