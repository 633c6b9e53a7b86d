pub mod cache;
pub mod context;
pub mod fetcher;
pub mod middleware;
pub mod service;

#[cfg(test)]
pub mod testing;

pub use context::ServiceContext;
pub use fetcher::Fetcher;
