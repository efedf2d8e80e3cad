use scraper::{ElementRef, Html, Selector};

use crate::formats::ScrapeMethod;
use crate::platform::Platform;

const PAGE_TEXT_LIMIT: usize = 5000;
const PAGE_TEXT_MIN: usize = 200;
const FALLBACK_MIN_CHARS: usize = 30;
const FALLBACK_MAX_CHARS: usize = 2000;

const TRUNCATION_MARKERS: &[&str] = &[
    "show more",
    "read more",
    "show full review",
    "read full review",
    "see more",
    "view more",
    "continue reading",
    "expand review",
];

const REVIEW_KEYWORDS: &[&str] = &[
    "work", "company", "job", "management", "employee", "culture", "team", "salary", "benefit",
    "environment", "position", "manager", "experience", "staff", "coworker", "colleague",
    "workplace", "supervisor", "boss", "pay", "overtime", "shift", "schedule", "hour", "training",
    "promotion", "career", "hired", "interview", "quit",
];

/// A review extracted from one page, before company context is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReview {
    pub topic: Option<String>,
    pub text: String,
    pub rating: Option<f32>,
    pub date: Option<String>,
    pub method: ScrapeMethod,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    /// Candidate elements inspected.
    pub found: usize,
    pub reviews: Vec<ParsedReview>,
}

impl ParseReport {
    pub fn dropped(&self) -> usize {
        self.found.saturating_sub(self.reviews.len())
    }
}

struct SelectorList(Vec<Selector>);

impl SelectorList {
    fn new(css: &[&str]) -> anyhow::Result<Self> {
        css.iter()
            .map(|css| compile(css))
            .collect::<anyhow::Result<Vec<_>>>()
            .map(Self)
    }

    /// Elements of the first selector matching more than `min_count`
    /// elements; otherwise those of the first selector matching any.
    fn select_candidates<'a>(&self, doc: &'a Html, min_count: usize) -> Vec<ElementRef<'a>> {
        let mut first_non_empty = Vec::new();
        for selector in &self.0 {
            let elements = doc.select(selector).collect::<Vec<_>>();
            if elements.len() > min_count {
                return elements;
            }
            if first_non_empty.is_empty() {
                first_non_empty = elements;
            }
        }
        first_non_empty
    }

    /// Text of the first descendant matched by any selector, in order, that
    /// is longer than `min_chars`.
    fn first_text(&self, element: &ElementRef<'_>, min_chars: usize) -> Option<String> {
        for selector in &self.0 {
            if let Some(found) = element.select(selector).next() {
                let text = element_text(&found);
                if text.chars().count() > min_chars {
                    return Some(text);
                }
            }
        }
        None
    }
}

fn compile(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("invalid selector {css:?}: {err:?}"))
}

/// Structural review extraction for every supported platform.
pub struct ReviewParser {
    glassdoor_reviews: SelectorList,
    glassdoor_topic: SelectorList,
    glassdoor_sections: Selector,
    glassdoor_text: SelectorList,
    indeed_reviews: SelectorList,
    indeed_topic: SelectorList,
    indeed_full_text: SelectorList,
    indeed_text: SelectorList,
    indeed_rating: SelectorList,
    comparably_reviews: SelectorList,
    generic_reviews: SelectorList,
    fallback_containers: Selector,
    fallback_headers: Selector,
    paragraph: Selector,
    rating: Selector,
    date: SelectorList,
    body: Selector,
}

impl ReviewParser {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            glassdoor_reviews: SelectorList::new(&[
                r#"li[class*="review"]"#,
                r#"li[class*="Review"]"#,
                r#"div[class*="review"]"#,
                r#"article[class*="review"]"#,
                r#"[data-test*="review"]"#,
            ])?,
            glassdoor_topic: SelectorList::new(&[
                r#"[class*="reviewTitle"]"#,
                r#"[class*="review-title"]"#,
                r#"[class*="Summary"]"#,
                "h2",
                "h3",
                r#"[data-test*="title"]"#,
            ])?,
            glassdoor_sections: compile(r#"[class*="fullWidth"], [class*="reviewBodyCell"]"#)?,
            glassdoor_text: SelectorList::new(&[
                r#"[class*="reviewText"]"#,
                r#"[class*="review-text"]"#,
                r#"[class*="description"]"#,
                r#"span[class*="cont"]"#,
            ])?,
            indeed_reviews: SelectorList::new(&[
                r#"[data-testid="review-card"]"#,
                r#"[data-testid="review"]"#,
                r#"[id*="cmp-review-"]"#,
                r#"div[class*="css-"][id*="review"]"#,
                r#"[data-tn-component="reviews"]"#,
                r#"[class*="review-item"]"#,
                r#"[class*="ReviewItem"]"#,
                r#"div[itemprop="review"]"#,
                r#"[class*="review"]"#,
            ])?,
            indeed_topic: SelectorList::new(&[
                r#"[data-testid="review-title"]"#,
                r#"[class*="review-title"]"#,
                r#"[class*="ReviewTitle"]"#,
                r#"[itemprop="name"]"#,
                "h2",
                "h3",
                r#"[data-tn-component*="reviewTitle"]"#,
            ])?,
            indeed_full_text: SelectorList::new(&[
                r#"[class*="expanded"]"#,
                r#"[class*="full-text"]"#,
                r#"[class*="full-review"]"#,
                r#"[style*="display:none"]"#,
                r#"[class*="collapsed"]"#,
            ])?,
            indeed_text: SelectorList::new(&[
                r#"[data-testid="review-text"]"#,
                r#"[itemprop="reviewBody"]"#,
                r#"[class*="review-text"]"#,
                r#"[class*="ReviewText"]"#,
                r#"[class*="reviewText"]"#,
                "p",
                "span",
            ])?,
            indeed_rating: SelectorList::new(&[
                r#"[itemprop="ratingValue"]"#,
                r#"[data-testid="rating"]"#,
                r#"[class*="rating"]"#,
            ])?,
            comparably_reviews: SelectorList::new(&[
                r#"[class*="review"]"#,
                r#"[class*="Review"]"#,
                "article",
                r#"[class*="comment"]"#,
            ])?,
            generic_reviews: SelectorList::new(&[
                "article",
                r#"[class*="review-card"]"#,
                r#"[class*="review"]"#,
                r#"[class*="Review"]"#,
            ])?,
            fallback_containers: compile("div, article, section, li")?,
            fallback_headers: compile("h2, h3, h4, h5, strong, b")?,
            paragraph: compile("p")?,
            rating: compile(r#"[class*="rating"]"#)?,
            date: SelectorList::new(&["time", r#"[class*="date"]"#, r#"[class*="Date"]"#])?,
            body: compile("body")?,
        })
    }

    /// Extracts at most `max_reviews` reviews from `html`.
    pub fn parse(&self, platform: Platform, html: &str, max_reviews: usize) -> ParseReport {
        if max_reviews == 0 {
            return ParseReport::default();
        }
        let doc = Html::parse_document(html);
        let report = match platform {
            Platform::Glassdoor => self.parse_glassdoor(&doc, max_reviews),
            Platform::Indeed => {
                let report = self.parse_indeed(&doc, max_reviews);
                if report.reviews.is_empty() {
                    tracing::debug!("primary indeed selectors found nothing; trying fallback");
                    let fallback = self.parse_indeed_fallback(&doc, max_reviews);
                    ParseReport {
                        found: report.found + fallback.found,
                        reviews: fallback.reviews,
                    }
                } else {
                    report
                }
            }
            Platform::Comparably => self.parse_blocks(
                &doc,
                &self.comparably_reviews,
                max_reviews,
                ScrapeMethod::Browser,
            ),
            Platform::Kununu | Platform::AmbitionBox => {
                let report = self.parse_blocks(
                    &doc,
                    &self.generic_reviews,
                    max_reviews,
                    ScrapeMethod::Browser,
                );
                if report.reviews.is_empty() {
                    self.parse_page_text(&doc, report.found)
                } else {
                    report
                }
            }
        };
        tracing::debug!(
            %platform,
            found = report.found,
            parsed = report.reviews.len(),
            "parsed page"
        );
        report
    }

    fn parse_glassdoor(&self, doc: &Html, max_reviews: usize) -> ParseReport {
        let elements = self.glassdoor_reviews.select_candidates(doc, 3);
        let found = elements.len().min(max_reviews);
        let mut reviews = Vec::new();

        for element in elements.into_iter().take(max_reviews) {
            let topic = self.glassdoor_topic.first_text(&element, 3);

            let mut pros = String::new();
            let mut cons = String::new();
            for section in element.select(&self.glassdoor_sections) {
                let text = element_text(&section);
                let head = text.chars().take(30).collect::<String>();
                if head.contains("Pros") {
                    pros = text.replace("Pros", "").replace("pros", "").trim().to_owned();
                } else if head.contains("Cons") {
                    cons = text.replace("Cons", "").replace("cons", "").trim().to_owned();
                }
            }
            let mut text = match (pros.is_empty(), cons.is_empty()) {
                (false, false) => format!("Pros: {pros}\n\nCons: {cons}"),
                (false, true) => pros,
                (true, false) => cons,
                (true, true) => String::new(),
            };

            if text.is_empty() {
                text = self.glassdoor_text.first_text(&element, 30).unwrap_or_default();
            }
            if text.is_empty() {
                text = element
                    .select(&self.paragraph)
                    .map(|p| element_text(&p))
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
            }

            let rating = element.select(&self.rating).next().and_then(|el| {
                el.value()
                    .attr("aria-label")
                    .filter(|label| !label.trim().is_empty())
                    .and_then(first_number)
                    .or_else(|| first_number(&element_text(&el)))
            });

            let text_ok = text.chars().count() > 30;
            let topic_ok = topic.as_deref().is_some_and(|t| t.chars().count() > 5);
            if !(text_ok || topic_ok) {
                continue;
            }
            if text.is_empty() {
                text = topic.clone().unwrap_or_default();
            }
            reviews.push(ParsedReview {
                topic,
                text,
                rating,
                date: self.date_of(&element),
                method: ScrapeMethod::Scraperapi,
            });
        }

        ParseReport { found, reviews }
    }

    fn parse_indeed(&self, doc: &Html, max_reviews: usize) -> ParseReport {
        let elements = self.indeed_reviews.select_candidates(doc, 0);
        let found = elements.len().min(max_reviews);
        let mut reviews = Vec::new();

        for element in elements.into_iter().take(max_reviews) {
            let topic = self.indeed_topic.first_text(&element, 3);

            let mut text = self
                .indeed_full_text
                .first_text(&element, 0)
                .unwrap_or_default();
            if text.chars().count() < 50
                && let Some(standard) = self.indeed_text.first_text(&element, 20)
                && standard.len() > text.len()
            {
                text = standard;
            }
            if text.is_empty() {
                text = element_text(&element);
            }
            let text = clean_review_text(&text);

            let rating = self.indeed_rating.0.iter().find_map(|selector| {
                let el = element.select(selector).next()?;
                let value = el.value();
                value
                    .attr("content")
                    .and_then(|content| content.trim().parse::<f32>().ok())
                    .or_else(|| value.attr("aria-label").and_then(first_number))
                    .or_else(|| first_number(&element_text(&el)))
            });

            if text.chars().count() <= 20 {
                continue;
            }
            reviews.push(ParsedReview {
                topic,
                text,
                rating,
                date: self.date_of(&element),
                method: ScrapeMethod::Scraperapi,
            });
        }

        ParseReport { found, reviews }
    }

    /// Keyword scan over generic containers for pages whose markup matches
    /// none of the known review selectors.
    fn parse_indeed_fallback(&self, doc: &Html, max_reviews: usize) -> ParseReport {
        let mut seen = std::collections::HashSet::new();
        let mut found = 0usize;
        let mut reviews = Vec::new();

        for container in doc
            .select(&self.fallback_containers)
            .take(max_reviews.saturating_mul(5))
        {
            let text = element_text(&container);
            let len = text.chars().count();
            if !(FALLBACK_MIN_CHARS..=FALLBACK_MAX_CHARS).contains(&len) {
                continue;
            }
            let signature = text.chars().take(100).collect::<String>().to_lowercase();
            if seen.contains(&signature) {
                continue;
            }
            let lower = text.to_lowercase();
            if !REVIEW_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
                continue;
            }
            found += 1;

            let topic = container
                .select(&self.fallback_headers)
                .map(|header| element_text(&header))
                .find(|header| (4..100).contains(&header.chars().count()));

            seen.insert(signature);
            reviews.push(ParsedReview {
                topic,
                text: clean_review_text(&text),
                rating: None,
                date: None,
                method: ScrapeMethod::ScraperapiFallback,
            });
            if reviews.len() >= max_reviews {
                break;
            }
        }

        if !reviews.is_empty() {
            tracing::info!(reviews = reviews.len(), "fallback parser found potential reviews");
        }
        ParseReport { found, reviews }
    }

    fn parse_blocks(
        &self,
        doc: &Html,
        selectors: &SelectorList,
        max_reviews: usize,
        method: ScrapeMethod,
    ) -> ParseReport {
        let elements = selectors.select_candidates(doc, 3);
        let found = elements.len().min(max_reviews);
        let reviews = elements
            .into_iter()
            .take(max_reviews)
            .filter_map(|element| {
                let text = clean_review_text(&element_text(&element));
                (text.chars().count() > 50).then(|| ParsedReview {
                    topic: None,
                    text,
                    rating: None,
                    date: self.date_of(&element),
                    method,
                })
            })
            .collect();
        ParseReport { found, reviews }
    }

    fn parse_page_text(&self, doc: &Html, found: usize) -> ParseReport {
        let Some(body) = doc.select(&self.body).next() else {
            return ParseReport {
                found,
                reviews: Vec::new(),
            };
        };
        let text = element_text(&body);
        if text.chars().count() <= PAGE_TEXT_MIN {
            return ParseReport {
                found,
                reviews: Vec::new(),
            };
        }
        ParseReport {
            found: found + 1,
            reviews: vec![ParsedReview {
                topic: None,
                text: text.chars().take(PAGE_TEXT_LIMIT).collect(),
                rating: None,
                date: None,
                method: ScrapeMethod::BrowserPageText,
            }],
        }
    }

    fn date_of(&self, element: &ElementRef<'_>) -> Option<String> {
        self.date.0.iter().find_map(|selector| {
            let el = element.select(selector).next()?;
            el.value()
                .attr("datetime")
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .or_else(|| Some(element_text(&el)).filter(|text| !text.is_empty()))
        })
    }
}

/// Whitespace-normalized text content of `element`.
pub fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// First decimal number in `text`, e.g. `4.0` in `"Rated 4.0 out of 5"`.
pub fn first_number(text: &str) -> Option<f32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let mut end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if rest[end..].starts_with('.') {
        let fraction = rest[end + 1..]
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len() - end - 1);
        end += 1 + fraction;
    }
    rest[..end].trim_end_matches('.').parse().ok()
}

/// Strips "Show more"-style truncation markers and trailing ellipses.
pub fn clean_review_text(text: &str) -> String {
    let mut cleaned = text.to_owned();
    for marker in TRUNCATION_MARKERS {
        cleaned = remove_marker(&cleaned, marker);
    }
    let mut cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    let trailing_dots = cleaned.len() - cleaned.trim_end_matches('.').len();
    if trailing_dots >= 2 {
        cleaned.truncate(cleaned.len() - trailing_dots);
        cleaned.truncate(cleaned.trim_end().len());
    }
    cleaned
}

fn remove_marker(text: &str, marker: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    while let Some(rel) = lower[cursor..].find(marker) {
        let start = cursor + rel;
        let mut end = start + marker.len();
        let dots = text[end..].chars().take(3).take_while(|&c| c == '.').count();
        end += dots;
        out.push_str(&text[cursor..start]);
        out.push(' ');
        cursor = end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEED_PAGE: &str = r#"<!doctype html>
<html><body>
  <div data-testid="review-card">
    <h2 data-testid="review-title">Great place to grow</h2>
    <div itemprop="ratingValue" content="4.0"></div>
    <time datetime="2025-03-01">March 1, 2025</time>
    <span data-testid="review-text">Supportive management and good benefits. Show more...</span>
  </div>
  <div data-testid="review-card">
    <h2 data-testid="review-title">Too short</h2>
    <span data-testid="review-text">Meh.</span>
  </div>
</body></html>"#;

    fn parser() -> ReviewParser {
        ReviewParser::new().unwrap()
    }

    #[test]
    fn indeed_cards_are_parsed_and_short_ones_dropped() {
        let report = parser().parse(Platform::Indeed, INDEED_PAGE, 10);
        assert_eq!(report.found, 2);
        assert_eq!(report.reviews.len(), 1);
        assert_eq!(report.dropped(), 1);

        let review = &report.reviews[0];
        assert_eq!(review.topic.as_deref(), Some("Great place to grow"));
        assert_eq!(review.text, "Supportive management and good benefits.");
        assert_eq!(review.rating, Some(4.0));
        assert_eq!(review.date.as_deref(), Some("2025-03-01"));
        assert_eq!(review.method, ScrapeMethod::Scraperapi);
    }

    #[test]
    fn review_budget_bounds_the_elements_considered() {
        let report = parser().parse(Platform::Indeed, INDEED_PAGE, 1);
        assert_eq!(report.found, 1);
        assert_eq!(report.reviews.len(), 1);
        assert!(parser().parse(Platform::Indeed, INDEED_PAGE, 0).reviews.is_empty());
    }

    #[test]
    fn indeed_fallback_uses_review_keywords() {
        let html = r#"<html><body>
          <section><h3>Honest take</h3>The management team changed every quarter and the schedule was chaotic.</section>
          <section>Footer links and copyright notice for the website 2025</section>
        </body></html>"#;
        let report = parser().parse(Platform::Indeed, html, 5);
        assert!(!report.reviews.is_empty());
        let review = &report.reviews[0];
        assert_eq!(review.method, ScrapeMethod::ScraperapiFallback);
        assert_eq!(review.topic.as_deref(), Some("Honest take"));
        assert!(review.text.contains("management team"));
    }

    #[test]
    fn glassdoor_combines_pros_and_cons() {
        let card = |title: &str| {
            format!(
                r#"<li class="empReview">
                  <h2 class="reviewTitle">{title}</h2>
                  <span class="ratingNumber" aria-label="Rated 3.5 out of 5">3.5</span>
                  <div class="fullWidth">Pros Flexible hours and friendly colleagues</div>
                  <div class="fullWidth">Cons Pay is below market average</div>
                </li>"#
            )
        };
        let html = format!(
            "<html><body><ul>{}{}{}{}</ul></body></html>",
            card("Solid employer"),
            card("Mixed bag"),
            card("Good start"),
            card("Fine")
        );
        let report = parser().parse(Platform::Glassdoor, &html, 10);
        assert_eq!(report.found, 4);
        assert_eq!(report.reviews.len(), 4);
        let review = &report.reviews[0];
        assert_eq!(review.topic.as_deref(), Some("Solid employer"));
        assert_eq!(
            review.text,
            "Pros: Flexible hours and friendly colleagues\n\nCons: Pay is below market average"
        );
        assert_eq!(review.rating, Some(3.5));
    }

    #[test]
    fn kununu_falls_back_to_page_text() {
        let body = "Arbeitgeber Bewertung ".repeat(20);
        let html = format!("<html><body><main>{body}</main></body></html>");
        let report = parser().parse(Platform::Kununu, &html, 10);
        assert_eq!(report.reviews.len(), 1);
        assert_eq!(report.reviews[0].method, ScrapeMethod::BrowserPageText);

        let report = parser().parse(Platform::AmbitionBox, "<html><body>tiny</body></html>", 10);
        assert!(report.reviews.is_empty());
    }

    #[test]
    fn comparably_needs_long_text() {
        let long = "The culture here is collaborative and leadership is transparent about goals.";
        let html = format!(
            "<html><body>{}<div class=\"review\">short</div></body></html>",
            format!("<div class=\"review\">{long}</div>").repeat(4)
        );
        let report = parser().parse(Platform::Comparably, &html, 10);
        assert_eq!(report.found, 5);
        assert_eq!(report.reviews.len(), 4);
        assert_eq!(report.reviews[0].method, ScrapeMethod::Browser);
    }

    #[test]
    fn truncation_markers_are_removed() {
        assert_eq!(
            clean_review_text("Good pay. Read More... and   nice people Show more"),
            "Good pay. and nice people"
        );
        assert_eq!(clean_review_text("Long hours..."), "Long hours");
        assert_eq!(clean_review_text("Great place."), "Great place.");
        assert_eq!(clean_review_text("Ünïcode stays ✓"), "Ünïcode stays ✓");
    }

    #[test]
    fn first_number_extracts_ratings() {
        assert_eq!(first_number("Rated 4.0 out of 5"), Some(4.0));
        assert_eq!(first_number("5 stars"), Some(5.0));
        assert_eq!(first_number("3. Good"), Some(3.0));
        assert_eq!(first_number("no rating"), None);
    }
}
