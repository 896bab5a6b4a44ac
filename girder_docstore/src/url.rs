use crate::DocstoreError;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

// RFC 3986 unreserved characters stay as they are
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A parsed collection URL: `scheme://authority/path?query`.
///
/// The authority (including any `user:pass@` part) and the path are kept
/// verbatim; query parameters are percent-decoded and re-encoded on display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionUrl {
    scheme: String,
    authority: String,
    path: String,
    query: Vec<(String, String)>,
}

impl CollectionUrl {
    /// Parses the given URL.
    pub fn parse(input: &str) -> Result<Self, DocstoreError> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| DocstoreError::invalid_url(input, "missing scheme"))?;

        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
            return Err(DocstoreError::invalid_url(input, "malformed scheme"));
        }

        let (before_query, query) = match rest.split_once('?') {
            Some((before_query, query)) => (before_query, query),
            None => (rest, ""),
        };

        let (authority, path) = match before_query.find('/') {
            Some(index) => before_query.split_at(index),
            None => (before_query, ""),
        };

        let query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(name), decode(value))
            })
            .collect();

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            authority: authority.to_string(),
            path: path.to_string(),
            query,
        })
    }

    /// Lowercase scheme, e.g. `mem`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Raw authority, e.g. `user:pass@host:27017`.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Host part of the authority, without user info.
    pub fn host(&self) -> &str {
        match self.authority.rsplit_once('@') {
            Some((_, host)) => host,
            None => &self.authority,
        }
    }

    /// Raw path, empty or starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Non-empty path segments.
    pub fn path_segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Replaces the path. A leading `/` is added when missing.
    pub fn set_path(&mut self, path: &str) {
        self.path = if path.is_empty() || path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
    }

    /// Value of the first query parameter with the given name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets a query parameter, replacing every previous value.
    pub fn set_query_param(&mut self, name: &str, value: &str) {
        self.query.retain(|(key, _)| key != name);
        self.query.push((name.to_string(), value.to_string()));
    }

    /// Removes a query parameter and returns its first value.
    pub fn remove_query_param(&mut self, name: &str) -> Option<String> {
        let value = self.query_param(name).map(str::to_string);
        self.query.retain(|(key, _)| key != name);

        value
    }

    /// Query string without the leading `?`.
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(name, QUERY_VALUE),
                    utf8_percent_encode(value, QUERY_VALUE),
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

impl Display for CollectionUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)?;

        if !self.query.is_empty() {
            write!(f, "?{}", self.query_string())?;
        }

        Ok(())
    }
}

impl FromStr for CollectionUrl {
    type Err = DocstoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_parts() {
        // When
        let url = CollectionUrl::parse("MongoDB://app:s%40cret@db:27017/web/sessions?id_field=ID&w=majority")
            .unwrap();

        // Then
        assert_eq!(url.scheme(), "mongodb");
        assert_eq!(url.authority(), "app:s%40cret@db:27017");
        assert_eq!(url.host(), "db:27017");
        assert_eq!(url.path_segments(), vec!["web", "sessions"]);
        assert_eq!(url.query_param("id_field"), Some("ID"));
        assert_eq!(url.query_param("w"), Some("majority"));
    }

    #[test]
    fn rewrites_query_and_path() {
        // Given
        let mut url = CollectionUrl::parse("mem://sessions/Key?a=1&a=2").unwrap();

        // When
        url.set_query_param("a", "x y");
        url.set_path("ID");

        // Then
        assert_eq!(url.to_string(), "mem://sessions/ID?a=x%20y");
    }

    #[test]
    fn rejects_missing_scheme() {
        // When
        let error = CollectionUrl::parse("sessions/ID").unwrap_err();

        // Then
        assert_eq!(
            error.to_string(),
            "invalid collection url 'sessions/ID': missing scheme",
        );
    }
}
