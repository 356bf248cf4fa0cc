pub mod aggregator;
pub mod fallback;
pub mod oracle;
pub mod recommend;
pub mod sources;

pub use aggregator::CandidateAggregator;
pub use oracle::{ChatCompletionsClient, Oracle};
pub use recommend::Recommender;
