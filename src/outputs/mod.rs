//! Stage artifact I/O.
//!
//! ```text
//! data/
//! ├── source_urls.json       # scraper input
//! ├── raw_articles.json      # scrape
//! ├── analyzed_articles.json # analyze
//! ├── final_report.json      # report
//! └── final_report_raw.txt   # report, only when the completion was rejected
//! ```

pub mod json;
