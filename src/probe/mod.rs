pub mod fetcher;
pub mod runner;
pub mod target;
pub mod validator;

// Re-export common types
pub use fetcher::HttpFetcher;
pub use runner::ProbeRunner;
