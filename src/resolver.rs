use scraper::{Html, Selector};

use crate::error::CatalogError;
use crate::wiki::WikiClient;

/// Strategy for pulling a portrait URL out of a rendered wiki page.
pub trait PortraitLocator {
    fn locate(&self, html: &str) -> Option<String>;
}

/// Picks the first `<img>` carrying the infobox thumbnail class.
#[derive(Debug, Clone)]
pub struct InfoboxPortraitLocator {
    selector: Selector,
}

impl InfoboxPortraitLocator {
    pub fn new(class: &str) -> Result<Self, CatalogError> {
        let query = format!("img.{}", class.trim());
        let selector = Selector::parse(&query).map_err(|err| {
            CatalogError::ConfigInvalid(format!("portrait class '{class}': {err}"))
        })?;
        Ok(Self { selector })
    }
}

impl PortraitLocator for InfoboxPortraitLocator {
    fn locate(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let element = document.select(&self.selector).next()?;
        let attr = |name: &str| {
            element
                .value()
                .attr(name)
                .map(str::trim)
                .filter(|value| !value.is_empty() && !value.starts_with("data:"))
        };
        // lazy-loaded thumbnails carry a placeholder in src
        attr("src").or_else(|| attr("data-src")).map(String::from)
    }
}

#[derive(Debug)]
pub enum Resolution {
    Found(String),
    NoImage,
    Failed(CatalogError),
}

#[derive(Debug, Clone)]
pub struct ImageResolver<L: PortraitLocator> {
    base_url: String,
    locator: L,
}

impl<L: PortraitLocator> ImageResolver<L> {
    pub fn new(base_url: impl Into<String>, locator: L) -> Self {
        Self {
            base_url: base_url.into(),
            locator,
        }
    }

    pub fn page_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), page_title(name))
    }

    pub fn resolve<W: WikiClient + ?Sized>(&self, client: &W, name: &str) -> Resolution {
        let url = self.page_url(name);
        let html = match client.fetch_page(&url) {
            Ok(html) => html,
            Err(err) => {
                tracing::error!(
                    character = name,
                    url = %url,
                    error = %err,
                    "failed to fetch wiki page"
                );
                return Resolution::Failed(err);
            }
        };
        match self.locator.locate(&html) {
            Some(src) => {
                let image_url = normalize_image_url(&src);
                tracing::info!(character = name, url = %image_url, "resolved portrait");
                Resolution::Found(image_url)
            }
            None => {
                tracing::warn!(character = name, url = %url, "no image found");
                Resolution::NoImage
            }
        }
    }
}

/// Wiki page title for a character name: spaces become underscores.
pub fn page_title(name: &str) -> String {
    let mut title = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        match ch {
            ' ' => title.push('_'),
            '?' => title.push_str("%3F"),
            '#' => title.push_str("%23"),
            other => title.push(other),
        }
    }
    title
}

pub fn normalize_image_url(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}
