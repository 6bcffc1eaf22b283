/// The current version of toolscout, sourced from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod error;
pub mod interceptor;
pub mod llm;
pub mod retriever;
pub mod session;
pub mod tools;

pub use config::InterceptorConfig;
pub use error::{Error, Result};
pub use interceptor::{ChatRequest, ChatResponse, ToolSearchInterceptor};
