//! Side-effecting adapters: files, processes, HTTP.

pub mod config;
pub mod health;
pub mod llm;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod session_store;
pub mod supervisor;
