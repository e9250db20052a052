#![forbid(unsafe_code)]

//! File-backed project metadata: the `.project` directory layout, the bulk
//! import pipeline that writes into it, and the passes that keep it consistent
//! (canonicalization, schema validation, reindexing).

mod store;

pub use store::*;
