//! Media host integration.
//!
//! Asset delivery URLs follow the hosted-media shape
//! `https://res.cloudinary.com/<account>/<resource_type>/upload/[v<digits>/]<public_id>.<ext>`.
//! The version segment is a cache-busting revision marker: two URLs that
//! differ only in version name the same underlying asset and must map to the
//! same destination identifier.

mod client;
mod migrate;

pub use client::{MediaClient, MediaTransfer};
pub use migrate::{AssetMigrator, AssetStats};

use once_cell::sync::Lazy;
use regex::Regex;

/// Delivery host for served assets.
pub const DELIVERY_HOST: &str = "res.cloudinary.com";

/// API base for uploads.
pub const UPLOAD_API_BASE: &str = "https://api.cloudinary.com/v1_1";

static VERSION_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v\d+$").expect("version segment pattern"));

/// Compiled URL shape for one media account's delivery URLs.
#[derive(Debug, Clone)]
pub struct AssetUrlPattern {
    regex: Regex,
}

impl AssetUrlPattern {
    /// Build the pattern for a media account.
    pub fn for_account(account: &str) -> Self {
        let pattern = format!(
            r"https?://{}/{}/(?:image|video|raw)/upload/[A-Za-z0-9_\-./%]+",
            regex::escape(DELIVERY_HOST),
            regex::escape(account)
        );
        Self {
            regex: Regex::new(&pattern).expect("asset URL pattern"),
        }
    }

    /// Check whether a string contains (or is) an asset URL of this shape.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Iterate over every asset URL embedded in a string.
    pub fn matches<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.regex.find_iter(text).map(move |m| m.as_str())
    }

    /// The underlying regex, for substitution.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

/// Derive the stable public identifier from a delivery URL.
///
/// The identifier is the path after the `upload` segment with the optional
/// `v<digits>` revision prefix and the file extension stripped; folder
/// segments are part of the identifier.
pub fn public_id(asset_url: &str) -> Option<String> {
    let parsed = url::Url::parse(asset_url).ok()?;
    let mut segments: Vec<&str> = parsed.path_segments()?.collect();

    let upload_pos = segments.iter().position(|s| *s == "upload")?;
    segments.drain(..=upload_pos);

    if let Some(first) = segments.first() {
        if VERSION_SEGMENT.is_match(first) {
            segments.remove(0);
        }
    }

    let last = segments.pop()?;
    let stem = match last.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => last,
    };
    if stem.is_empty() {
        return None;
    }
    segments.push(stem);

    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_id_strips_version_and_extension() {
        let id = public_id(
            "https://res.cloudinary.com/site-staging/image/upload/v1588021551/partner_logo_abc123.png",
        );
        assert_eq!(id.as_deref(), Some("partner_logo_abc123"));
    }

    #[test]
    fn test_public_id_without_version_segment() {
        let id = public_id(
            "https://res.cloudinary.com/site-staging/image/upload/partner_logo_abc123.png",
        );
        assert_eq!(id.as_deref(), Some("partner_logo_abc123"));
    }

    #[test]
    fn test_different_versions_share_an_identifier() {
        let a = public_id(
            "https://res.cloudinary.com/site-staging/image/upload/v100/team/headshot.jpg",
        );
        let b = public_id(
            "https://res.cloudinary.com/site-staging/image/upload/v987654/team/headshot.jpg",
        );
        assert_eq!(a, b);
        assert_eq!(a.as_deref(), Some("team/headshot"));
    }

    #[test]
    fn test_public_id_keeps_folder_segments() {
        let id = public_id(
            "https://res.cloudinary.com/site-staging/raw/upload/v17/docs/reports/annual_2020.pdf",
        );
        assert_eq!(id.as_deref(), Some("docs/reports/annual_2020"));
    }

    #[test]
    fn test_public_id_rejects_foreign_urls() {
        assert_eq!(public_id("https://example.com/logo.png"), None);
        assert_eq!(public_id("not a url"), None);
    }

    #[test]
    fn test_pattern_matches_only_own_account() {
        let pattern = AssetUrlPattern::for_account("site-staging");
        assert!(pattern.is_match(
            "https://res.cloudinary.com/site-staging/image/upload/v1/logo.png"
        ));
        assert!(!pattern.is_match(
            "https://res.cloudinary.com/other-account/image/upload/v1/logo.png"
        ));
        assert!(!pattern.is_match("https://example.com/image/upload/logo.png"));
    }

    #[test]
    fn test_pattern_finds_urls_inside_html() {
        let pattern = AssetUrlPattern::for_account("site-staging");
        let html = "<p><img src='https://res.cloudinary.com/site-staging/image/upload/v1/a.png'>\
                    and <img src=\"https://res.cloudinary.com/site-staging/image/upload/v2/b.jpg\"></p>";
        let found: Vec<&str> = pattern.matches(html).collect();
        assert_eq!(
            found,
            vec![
                "https://res.cloudinary.com/site-staging/image/upload/v1/a.png",
                "https://res.cloudinary.com/site-staging/image/upload/v2/b.jpg",
            ]
        );
    }
}
