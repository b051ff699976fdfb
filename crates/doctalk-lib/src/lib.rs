pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod lock;
pub mod output;
pub mod pipeline;
pub mod runtime;
pub mod session;

#[cfg(test)]
mod test_util;
