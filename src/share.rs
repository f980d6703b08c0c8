use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::catalog::ItemId;

pub const ITEM_QUERY_PARAM: &str = "image";
const SITE_SUFFIX: &str = " | eazyfilms";

/// Characters left unescaped by browsers' `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("share: clipboard unavailable: {0}")]
    Clipboard(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Twitter,
    Facebook,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Twitter, Platform::Facebook];

    pub fn label(self) -> &'static str {
        match self {
            Platform::Twitter => "Twitter",
            Platform::Facebook => "Facebook",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShareLinkBuilder {
    origin: Url,
}

impl ShareLinkBuilder {
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url.trim())
            .with_context(|| format!("share: invalid base url {base_url:?}"))?;
        let origin = parsed
            .join("/")
            .with_context(|| format!("share: base url has no origin {base_url:?}"))?;
        Ok(Self { origin })
    }

    pub fn build_link(&self, item_id: ItemId) -> Url {
        let mut url = self.origin.clone();
        url.set_query(Some(&format!("{ITEM_QUERY_PARAM}={item_id}")));
        url
    }

    pub fn build_intent(&self, platform: Platform, item_id: ItemId, title: &str) -> Url {
        let link = self.build_link(item_id);
        let link = encode(link.as_str());
        let raw = match platform {
            Platform::Twitter => format!(
                "https://twitter.com/intent/tweet?text={}&url={}",
                encode(&format!("{title}{SITE_SUFFIX}")),
                link
            ),
            Platform::Facebook => {
                format!("https://www.facebook.com/sharer/sharer.php?u={link}")
            }
        };
        // Every component above is percent-encoded, so the string always parses.
        Url::parse(&raw).unwrap_or_else(|_| self.build_link(item_id))
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Resolves a deep link (`...?image=<id>`) or a bare id.
pub fn parse_link(input: &str) -> Option<ItemId> {
    let input = input.trim();
    if let Ok(id) = input.parse::<ItemId>() {
        return Some(id);
    }
    let url = Url::parse(input).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == ITEM_QUERY_PARAM)
        .and_then(|(_, value)| value.trim().parse::<ItemId>().ok())
}

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|err| ShareError::Clipboard(err.to_string()))?;
    clipboard
        .set_text(text.to_string())
        .map_err(|err| ShareError::Clipboard(err.to_string()))?;
    Ok(())
}

pub fn open_in_browser(url: &Url) -> Result<()> {
    webbrowser::open(url.as_str()).with_context(|| format!("share: open {url}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ShareLinkBuilder {
        ShareLinkBuilder::new("https://eazyfilms.com/gallery?x=1").unwrap()
    }

    #[test]
    fn link_uses_origin_and_item_param() {
        assert_eq!(
            builder().build_link(42).as_str(),
            "https://eazyfilms.com/?image=42"
        );
    }

    #[test]
    fn links_resolve_back_to_item() {
        let link = builder().build_link(17);
        assert_eq!(parse_link(link.as_str()), Some(17));
        assert_eq!(parse_link(" 9 "), Some(9));
        assert_eq!(parse_link("https://eazyfilms.com/?other=1"), None);
        assert_eq!(parse_link("not a link"), None);
    }

    #[test]
    fn twitter_intent_encodes_title_and_link() {
        let intent = builder().build_intent(Platform::Twitter, 3, "Rain & Neon");
        assert_eq!(intent.host_str(), Some("twitter.com"));
        assert_eq!(
            intent.as_str(),
            "https://twitter.com/intent/tweet?text=Rain%20%26%20Neon%20%7C%20eazyfilms&url=https%3A%2F%2Feazyfilms.com%2F%3Fimage%3D3"
        );
        let pairs: Vec<(String, String)> = intent.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("text".to_string(), "Rain & Neon | eazyfilms".to_string())));
        assert!(pairs.contains(&(
            "url".to_string(),
            "https://eazyfilms.com/?image=3".to_string()
        )));
    }

    #[test]
    fn facebook_intent_carries_link() {
        let intent = builder().build_intent(Platform::Facebook, 8, "ignored");
        let pairs: Vec<(String, String)> = intent.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![("u".to_string(), "https://eazyfilms.com/?image=8".to_string())]
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(ShareLinkBuilder::new("eazyfilms").is_err());
    }
}
