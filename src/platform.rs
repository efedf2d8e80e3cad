use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

const INDEED_REVIEWS_PER_PAGE: u32 = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Glassdoor,
    Indeed,
    Comparably,
    Kununu,
    #[serde(rename = "ambitionbox")]
    #[value(name = "ambitionbox")]
    AmbitionBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Routed through the remote rendering API.
    Api,
    /// Loaded directly in a WebDriver session.
    Browser,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Glassdoor,
        Platform::Indeed,
        Platform::Comparably,
        Platform::Kununu,
        Platform::AmbitionBox,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Glassdoor => "glassdoor",
            Platform::Indeed => "indeed",
            Platform::Comparably => "comparably",
            Platform::Kununu => "kununu",
            Platform::AmbitionBox => "ambitionbox",
        }
    }

    pub fn strategy(self) -> FetchStrategy {
        match self {
            Platform::Glassdoor | Platform::Indeed => FetchStrategy::Api,
            Platform::Comparably | Platform::Kununu | Platform::AmbitionBox => {
                FetchStrategy::Browser
            }
        }
    }

    /// URLs of the first `max_pages` review pages, starting from `base_url`.
    ///
    /// Browser platforms are not paginated and always yield the base URL only.
    pub fn page_urls(self, base_url: &str, max_pages: u32) -> Vec<String> {
        if max_pages == 0 {
            return Vec::new();
        }
        match self {
            Platform::Glassdoor => glassdoor_page_urls(base_url, max_pages),
            Platform::Indeed => indeed_page_urls(base_url, max_pages),
            Platform::Comparably | Platform::Kununu | Platform::AmbitionBox => {
                vec![base_url.to_owned()]
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlassdoorCompany {
    pub origin: String,
    pub name: String,
    pub id: String,
}

impl GlassdoorCompany {
    pub fn page_url(&self, page: u32) -> String {
        if page <= 1 {
            format!("{}/Reviews/{}-Reviews-E{}.htm", self.origin, self.name, self.id)
        } else {
            format!(
                "{}/Reviews/{}-Reviews-E{}_P{page}.htm",
                self.origin, self.name, self.id
            )
        }
    }
}

/// Extracts the company slug and employer id from a Glassdoor reviews URL.
///
/// Location-filtered URLs such as
/// `/Reviews/Acme-Reviews-EI_IE4258.0,22_IL.23,32_IM358.htm` are reduced to
/// the plain company page `/Reviews/Acme-Reviews-E4258.htm`.
pub fn parse_glassdoor_url(url: &str) -> Option<GlassdoorCompany> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if !host.contains("glassdoor.") {
        return None;
    }

    let id = employer_id(url)?;

    let path = parsed.path();
    let rest = &path[path.find("/Reviews/")? + "/Reviews/".len()..];
    let segment = rest.split('/').next().unwrap_or_default();
    let name_end = segment.char_indices().skip(1).map(|(i, _)| i).find(|&i| {
        let tail = &segment[i..];
        tail.starts_with("-Reviews")
            || tail.starts_with("-Greenwood")
            || tail.starts_with("-Portland")
    })?;
    let name = segment[..name_end].to_owned();

    let origin = match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    };

    Some(GlassdoorCompany { origin, name, id })
}

fn employer_id(url: &str) -> Option<String> {
    let mut cursor = 0usize;
    while let Some(rel) = url[cursor..].find("IE") {
        let start = cursor + rel + 2;
        let digits: String = url[start..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if !digits.is_empty() {
            return Some(digits);
        }
        cursor = start;
    }
    None
}

fn glassdoor_page_urls(base_url: &str, max_pages: u32) -> Vec<String> {
    let Some(company) = parse_glassdoor_url(base_url) else {
        tracing::warn!(url = base_url, "could not parse glassdoor url for pagination");
        return vec![base_url.to_owned()];
    };
    (1..=max_pages).map(|page| company.page_url(page)).collect()
}

/// `/cmp/{name}` company pages 404 through the rendering API; the reviews
/// live under `/cmp/{name}/reviews`.
pub fn indeed_reviews_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_owned();
    };
    let is_indeed = parsed
        .host_str()
        .is_some_and(|host| host.contains("indeed."));
    let path = parsed.path().trim_end_matches('/').to_owned();
    if !is_indeed || !path.starts_with("/cmp/") || path.contains("/reviews") {
        return url.to_owned();
    }
    parsed.set_path(&format!("{path}/reviews"));
    parsed.to_string()
}

fn indeed_page_urls(base_url: &str, max_pages: u32) -> Vec<String> {
    let base_url = indeed_reviews_url(base_url);
    let base_url = base_url.as_str();
    (0..max_pages)
        .map(|page| {
            if page == 0 {
                return base_url.to_owned();
            }
            let separator = if base_url.contains('?') { '&' } else { '?' };
            let start = page * INDEED_REVIEWS_PER_PAGE;
            format!("{base_url}{separator}start={start}")
        })
        .collect()
}
