use chrono::NaiveDate;
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use tracing::trace;
use url::Url;

use crate::dates::date_in_link;

/// A published bulletin as found on the index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulletinLink {
    pub date: NaiveDate,
    pub url: Url,
}

/// Collects the dated PDF links on the index page, one per date, sorted by
/// date. When a date is linked more than once the first link wins.
pub fn parse_bulletin_links(html: &str, base: &Url) -> Vec<BulletinLink> {
    let selector = Selector::parse("a[href]").expect("CSS selector for links should be valid");
    let doc = Html::parse_document(html);

    let mut by_date: BTreeMap<NaiveDate, Url> = BTreeMap::new();
    for href in doc.select(&selector).filter_map(|e| e.value().attr("href")) {
        let Ok(url) = base.join(href) else {
            continue;
        };
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();
        if !file_name.to_ascii_lowercase().ends_with(".pdf") {
            continue;
        }
        if let Some(date) = date_in_link(file_name) {
            trace!(%url, %date, "found bulletin link");
            by_date.entry(date).or_insert(url);
        }
    }

    by_date
        .into_iter()
        .map(|(date, url)| BulletinLink { date, url })
        .collect()
}
