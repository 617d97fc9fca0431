pub mod config;
pub mod crawl;
pub mod error;
pub mod report;
pub mod similarity;
pub mod soft404;
pub mod validate;

pub use config::{ConfigError, CrawlConfig, FetchSettings, RedirectPolicy, ValidationConfig};
pub use crawl::execute_crawl;
pub use error::{CoreError, Result};
pub use report::{CrawlReport, ValidationReport, ValidationSummary};
pub use validate::{
    Issue, IssueKind, SourcePage, Status, ValidationRecord, Validator, execute_validation,
    pages_from_crawl,
};
