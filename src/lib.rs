#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

pub mod core;
pub mod export;
pub mod format;
pub mod prelude;
pub mod prices;
pub mod quantity;
pub mod tables;
