#![forbid(unsafe_code)]

pub mod autosave;
pub mod batch;
pub mod buffers;
pub mod generate;
pub mod logging;
pub mod model;
pub mod notify;
pub mod openai;
pub mod rewrite;
pub mod store;
pub mod structure;
pub mod styles;
pub mod tree;
