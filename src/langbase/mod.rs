mod backend;
mod client;
mod types;

pub use backend::LangbaseBackend;
pub use client::LangbaseClient;
pub use types::*;
