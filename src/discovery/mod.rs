pub mod document;
pub mod engine;

// Re-export common types
pub use document::HtmlPage;
pub use engine::{DiscoveryEngine, DiscoveryReport, LinkSample};
