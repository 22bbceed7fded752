// ViewerContext middleware and extractor

pub mod viewer_context_extractor;
pub mod viewer_context_middleware;

pub use viewer_context_extractor::Vc;
pub use viewer_context_middleware::{bearer_token, viewer_context_middleware, HasViewerResolver};
