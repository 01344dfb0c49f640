//! Anti-forgery token sources
//!
//! A missing token is not an error; deliveries go out without the header.

use crate::utils::config::TelemetryConfig;
use crate::utils::errors::{Result, TelemetryError};
use tracing::{debug, warn};

/// Meta tag name pages use to expose the token
pub const CSRF_META_NAME: &str = "csrf-token";

/// Supplies the anti-forgery token for each delivery
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// No token available
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

impl TokenSource for NoToken {
    fn token(&self) -> Option<String> {
        None
    }
}

/// Fixed token, from configuration or scraped from a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Read the token from `<meta name="csrf-token" content="...">`
    pub fn from_meta_tag(html: &str) -> Option<Self> {
        meta_content(html, CSRF_META_NAME).map(Self)
    }

    /// Resolve the configured token: `csrf_token` wins, otherwise the meta
    /// tag of `csrf_page`. An unreadable page is a configuration error; a
    /// page without the tag just means no token.
    pub fn from_config(config: &TelemetryConfig) -> Result<Option<Self>> {
        if let Some(token) = &config.csrf_token {
            return Ok(Some(Self::new(token.clone())));
        }
        let Some(path) = &config.csrf_page else {
            return Ok(None);
        };

        let html = std::fs::read_to_string(path).map_err(|e| {
            TelemetryError::Config(format!("cannot read csrf_page {}: {}", path.display(), e))
        })?;
        match Self::from_meta_tag(&html) {
            Some(token) => {
                debug!("Anti-forgery token read from {}", path.display());
                Ok(Some(token))
            }
            None => {
                warn!(
                    "No {} meta tag in {}, delivering without a token",
                    CSRF_META_NAME,
                    path.display()
                );
                Ok(None)
            }
        }
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

impl TokenSource for Option<StaticToken> {
    fn token(&self) -> Option<String> {
        self.as_ref().and_then(|t| t.token())
    }
}

/// `content` of the first `<meta>` tag whose `name` is `name`
pub fn meta_content(html: &str, name: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `html`
    let lower = html.to_ascii_lowercase();
    let mut offset = 0;

    while let Some(start) = lower[offset..].find("<meta") {
        let tag_start = offset + start;
        let tag_end = lower[tag_start..]
            .find('>')
            .map(|end| tag_start + end)
            .unwrap_or(lower.len());
        let tag = &html[tag_start + "<meta".len()..tag_end];

        if attribute(tag, "name").is_some_and(|n| n.eq_ignore_ascii_case(name)) {
            return attribute(tag, "content")
                .filter(|c| !c.is_empty())
                .map(str::to_string);
        }
        offset = tag_end;
    }
    None
}

/// Value of attribute `key` inside the body of a tag
fn attribute<'a>(tag: &'a str, key: &str) -> Option<&'a str> {
    let mut rest = tag;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
        if rest.is_empty() {
            return None;
        }

        let name_end = rest
            .find(|c: char| c == '=' || c.is_whitespace() || c == '/')
            .unwrap_or(rest.len());
        let attr_name = &rest[..name_end];
        rest = rest[name_end..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let close = body.find(quote).unwrap_or(body.len());
                    rest = body.get(close + 1..).unwrap_or("");
                    &body[..close]
                }
                _ => {
                    let end = after_eq
                        .find(char::is_whitespace)
                        .unwrap_or(after_eq.len());
                    rest = &after_eq[end..];
                    &after_eq[..end]
                }
            }
        } else {
            ""
        };

        if attr_name.eq_ignore_ascii_case(key) {
            return Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_token() {
        assert!(NoToken.token().is_none());
        assert!(None::<StaticToken>.token().is_none());
    }

    #[test]
    fn test_static_token() {
        let token = StaticToken::new("abc123");
        assert_eq!(token.token().as_deref(), Some("abc123"));
        assert_eq!(Some(token).token().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_meta_tag_extraction() {
        let html = r#"<html><head>
            <meta charset="utf-8">
            <META Name="csrf-token" content='tok-XYZ'>
            </head></html>"#;
        let token = StaticToken::from_meta_tag(html).unwrap();
        assert_eq!(token.token().as_deref(), Some("tok-XYZ"));
    }

    #[test]
    fn test_meta_tag_attribute_order_and_self_closing() {
        let html = r#"<meta content="later" name="csrf-token"/>"#;
        assert_eq!(meta_content(html, CSRF_META_NAME).as_deref(), Some("later"));
    }

    #[test]
    fn test_meta_tag_missing_or_empty() {
        assert!(meta_content("<meta name=\"viewport\" content=\"width\">", CSRF_META_NAME).is_none());
        assert!(meta_content("<meta name=\"csrf-token\" content=\"\">", CSRF_META_NAME).is_none());
        assert!(meta_content("", CSRF_META_NAME).is_none());
    }

    fn write_page(html: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("csrf-page-{}.html", ulid::Ulid::new()));
        std::fs::write(&path, html).unwrap();
        path
    }

    #[test]
    fn test_from_config_prefers_explicit_token() {
        let page = write_page(r#"<meta name="csrf-token" content="from-page">"#);
        let config = TelemetryConfig {
            csrf_token: Some("explicit".to_string()),
            csrf_page: Some(page.clone()),
            ..Default::default()
        };
        assert_eq!(StaticToken::from_config(&config).unwrap(), Some(StaticToken::new("explicit")));
        std::fs::remove_file(page).unwrap();
    }

    #[test]
    fn test_from_config_reads_page_meta_tag() {
        let page = write_page(r#"<head><meta name="csrf-token" content="from-page"></head>"#);
        let config = TelemetryConfig {
            csrf_page: Some(page.clone()),
            ..Default::default()
        };
        assert_eq!(StaticToken::from_config(&config).unwrap(), Some(StaticToken::new("from-page")));

        std::fs::write(&page, "<head></head>").unwrap();
        assert_eq!(StaticToken::from_config(&config).unwrap(), None);
        std::fs::remove_file(page).unwrap();
    }

    #[test]
    fn test_from_config_unreadable_page() {
        let config = TelemetryConfig {
            csrf_page: Some(std::env::temp_dir().join("no-such-dir").join("page.html")),
            ..Default::default()
        };
        assert!(matches!(StaticToken::from_config(&config), Err(TelemetryError::Config(_))));
        assert_eq!(StaticToken::from_config(&TelemetryConfig::default()).unwrap(), None);
    }

    #[test]
    fn test_unquoted_attribute() {
        let html = "<meta name=csrf-token content=plain>";
        assert_eq!(meta_content(html, CSRF_META_NAME).as_deref(), Some("plain"));
    }
}
