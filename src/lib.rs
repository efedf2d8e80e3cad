#![forbid(unsafe_code)]

pub mod backoff;
pub mod browser;
pub mod cli;
pub mod config;
pub mod debug_html;
pub mod fetch;
pub mod formats;
pub mod key_ring;
pub mod logging;
pub mod pacing;
pub mod pager;
pub mod parse;
pub mod platform;
pub mod run;
pub mod scraper_api;
pub mod store;
