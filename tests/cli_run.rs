use predicates::prelude::*;

fn reviewscrape() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("reviewscrape");
    cmd.env_remove("SCRAPERAPI_KEY");
    for i in 1..=4 {
        cmd.env_remove(format!("SCRAPERAPI_KEY_{i}"));
    }
    cmd
}

#[test]
fn help_lists_flags() {
    reviewscrape()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--companies"))
        .stdout(predicate::str::contains("--no-browser"));
}

#[test]
fn missing_companies_file_exits_with_failure() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let missing = temp.path().join("nope.json");

    reviewscrape()
        .args(["--companies", missing.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("read companies"));
    Ok(())
}

#[test]
fn invalid_config_file_exits_with_failure() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let config = temp.path().join("config.yaml");
    std::fs::write(&config, "page_delay_secs: [5, 1]\n")?;

    reviewscrape()
        .args(["--config", config.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("load config"));
    Ok(())
}

#[test]
fn run_without_keys_or_browser_skips_everything() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let companies = temp.path().join("companies.json");
    let out = temp.path().join("out").join("reviews.json");
    std::fs::write(
        &companies,
        r#"[{"company_name": "Acme", "indeed_url": "https://www.indeed.com/cmp/Acme/reviews", "kununu_url": "https://www.kununu.com/de/acme"}]"#,
    )?;

    reviewscrape()
        .env("RUST_LOG", "debug")
        .args([
            "--companies",
            companies.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--no-browser",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"))
        .stderr(predicate::str::contains("run finished"));

    assert!(!out.exists());
    Ok(())
}

#[test]
fn unknown_platform_is_rejected() {
    reviewscrape()
        .args(["--platform", "linkedin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
