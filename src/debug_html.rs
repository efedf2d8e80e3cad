use std::path::{Path, PathBuf};

use anyhow::Context as _;
use scraper::{Html, Selector};

const DUMP_LIMIT_BYTES: usize = 100 * 1024;
const FILE_STEM_MAX_CHARS: usize = 50;
const COUNTED_TAGS: &[&str] = &["div", "article", "section", "li", "p"];
const COUNTED_KEYWORDS: &[&str] = &["review", "rating", "pros", "cons", "employee", "captcha"];

/// Saves a page that parsed to nothing so selectors can be fixed later.
///
/// Writes `{dir}/{company}.html`: a comment block with diagnostics followed
/// by the first 100 KB of the page.
pub fn write_dump(dir: &Path, company: &str, url: &str, html: &str) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create debug html dir: {}", dir.display()))?;
    let path = dir.join(format!("{}.html", file_stem(company)));

    let mut out = diagnostics(url, html);
    out.push('\n');
    out.push_str(prefix(html, DUMP_LIMIT_BYTES));
    std::fs::write(&path, out).with_context(|| format!("write debug html: {}", path.display()))?;
    Ok(path)
}

fn file_stem(company: &str) -> String {
    let stem = company
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .take(FILE_STEM_MAX_CHARS)
        .collect::<String>();
    if stem.is_empty() {
        "company".to_owned()
    } else {
        stem
    }
}

fn prefix(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn diagnostics(url: &str, html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut lines = vec![
        format!("URL: {}", url.replace("--", "%2D%2D")),
        format!("Length: {} bytes", html.len()),
    ];

    for tag in COUNTED_TAGS {
        if let Ok(selector) = Selector::parse(tag) {
            lines.push(format!("<{tag}> elements: {}", doc.select(&selector).count()));
        }
    }

    let lower = html.to_lowercase();
    for keyword in COUNTED_KEYWORDS {
        lines.push(format!("'{keyword}' occurrences: {}", lower.matches(keyword).count()));
    }

    let title = Selector::parse("title")
        .ok()
        .and_then(|selector| {
            doc.select(&selector)
                .next()
                .map(|el| el.text().collect::<String>())
        })
        .map(|title| title.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    lines.push(format!("Title: {}", title.replace("--", "- -")));

    format!("<!--\n{}\n-->", lines.join("\n"))
}
