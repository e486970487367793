pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod graphrag;
pub mod indexing;
pub mod llm;
pub mod prompt_tune;
pub mod prompts;
pub mod scoring;
pub mod search;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use dispatcher::StrategyDispatcher;
pub use engine::{FragmentStream, GraphEngine, StrategyCall};
pub use graphrag::GraphRagEngine;
pub use search::{Fragment, SearchKind, SearchRequest, SearchResult};
