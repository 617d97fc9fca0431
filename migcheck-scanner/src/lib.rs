pub mod crawler;
pub mod direct;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod render_proxy;
pub mod result;
pub mod scheduler;

pub use crawler::{Crawler, ProgressCallback};
pub use direct::DirectFetcher;
pub use error::ScanError;
pub use fetch::{
    FailureKind, FetchFailure, FetchOptions, FetchOutcome, FetchOutcomeExt, FetchedPage,
    PageFetcher, RendererKind, build_fetcher,
};
pub use render_proxy::RenderProxyFetcher;
pub use result::{CrawlOutput, CrawlRecord, CrawlStats};
pub use scheduler::{ProgressFn, run_bounded};
