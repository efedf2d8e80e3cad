use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::formats::{FailedScrape, ReviewRecord};
use crate::platform::Platform;

/// Append-only JSON array of scraped reviews.
///
/// The whole file is rewritten after every append so a killed run never
/// leaves a truncated array behind.
#[derive(Debug)]
pub struct ReviewStore {
    path: PathBuf,
    records: Vec<ReviewRecord>,
    scraped: HashSet<(String, Platform)>,
}

impl ReviewStore {
    /// Opens `path`, loading records left by earlier runs.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let records: Vec<ReviewRecord> = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parse existing reviews: {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read existing reviews: {}", path.display()));
            }
        };
        let scraped = records
            .iter()
            .map(|record| (record.company_name.clone(), record.platform))
            .collect();
        Ok(Self {
            path,
            records,
            scraped,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[ReviewRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pairs already present in the output are not scraped again.
    pub fn already_scraped(&self, company_name: &str, platform: Platform) -> bool {
        self.scraped
            .contains(&(company_name.to_owned(), platform))
    }

    pub fn scraped_pairs(&self) -> usize {
        self.scraped.len()
    }

    /// Appends `records` and rewrites the output file.
    ///
    /// Records stay in memory even when the write fails, so the next
    /// successful append still persists them.
    pub fn append(&mut self, records: Vec<ReviewRecord>) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        for record in &records {
            self.scraped
                .insert((record.company_name.clone(), record.platform));
        }
        self.records.extend(records);
        write_json_atomic(&self.path, &self.records).context("write reviews")
    }
}

/// JSONL log of company/platform pairs that could not be scraped.
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, failure: &FailedScrape) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create failure log dir: {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open failure log: {}", self.path.display()))?;
        let mut line = serde_json::to_vec(failure).context("serialize failure record")?;
        line.push(b'\n');
        file.write_all(&line)
            .with_context(|| format!("write failure log: {}", self.path.display()))?;
        Ok(())
    }
}

pub(crate) fn write_json_atomic<T: serde::Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    std::fs::write(&tmp_path, &data)
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::ScrapeMethod;

    fn review(company: &str, platform: Platform, text: &str) -> ReviewRecord {
        ReviewRecord {
            company_name: company.to_owned(),
            location: None,
            platform,
            url: "https://example.com".to_owned(),
            topic: None,
            text: text.to_owned(),
            rating: Some(4.0),
            date: None,
            page: 1,
            scraped_at: "2026-01-01T00:00:00Z".to_owned(),
            method: ScrapeMethod::Scraperapi,
        }
    }

    #[test]
    fn appends_survive_reopen() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("nested").join("reviews.json");

        let mut store = ReviewStore::open(&path)?;
        assert!(store.is_empty());
        store.append(vec![review("Acme", Platform::Indeed, "first")])?;
        store.append(vec![review("Beta", Platform::Kununu, "second")])?;

        let reopened = ReviewStore::open(&path)?;
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.records()[1].text, "second");
        assert!(reopened.already_scraped("Acme", Platform::Indeed));
        assert!(!reopened.already_scraped("Acme", Platform::Glassdoor));
        assert_eq!(reopened.scraped_pairs(), 2);
        Ok(())
    }

    #[test]
    fn corrupt_output_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("reviews.json");
        std::fs::write(&path, "{not json")?;
        assert!(ReviewStore::open(&path).is_err());
        Ok(())
    }

    #[test]
    fn failure_log_appends_lines() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let log = FailureLog::new(temp.path().join("failed.jsonl"));
        for company in ["Acme", "Beta"] {
            log.append(&FailedScrape {
                company_name: company.to_owned(),
                platform: Platform::Indeed,
                url: "https://example.com".to_owned(),
                error: "HTTP 500".to_owned(),
                timestamp: "2026-01-01T00:00:00Z".to_owned(),
            })?;
        }
        let contents = std::fs::read_to_string(log.path())?;
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let second: FailedScrape = serde_json::from_str(lines[1])?;
        assert_eq!(second.company_name, "Beta");
        Ok(())
    }
}
