#![forbid(unsafe_code)]

pub mod assemble;
pub mod audit;
pub mod build;
pub mod cli;
pub mod crawl;
pub mod discover;
pub mod epub;
pub mod extract;
pub mod formats;
pub mod logging;
pub mod rewrite;
pub mod visited;
