mod extractor;
mod limiter;
mod pipeline;

pub use extractor::{CommandExtractor, ExtractError, Extractor};
pub use limiter::ConcurrencyLimiter;
pub use pipeline::{remove_if_exists, DownloadError, DownloadPipeline};
