mod chain;
mod fetcher;
mod models;
mod parser;
mod pipeline;
mod query;
mod tracker;

pub use chain::{FetchChain, FetchedBatch, NewsSource};
pub use fetcher::{HttpSourceClient, SourceClient};
pub use models::{
    format_day_month, parse_pub_date, NewsItem, NewsView, RawItem, SourceKind, StoredNews,
    DEFAULT_CATEGORY,
};
pub use parser::{decode_entities, FeedParser, HtmlParser, NewsParser};
pub use pipeline::{NewsPipeline, RunOutcome, RunReport};
pub use query::NewsQuery;
pub use tracker::{FailureTracker, FetchStatus, TrackerState};

#[cfg(test)]
pub(crate) use chain::testing;
