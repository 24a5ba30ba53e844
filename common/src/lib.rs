//! Storage-layer building blocks shared by the rose-db crates: the tuple
//! model, the storage manager API, page layout and heap files.

pub mod api;
pub mod disk_manager;
pub mod heap_file;
pub mod page;
pub mod tuple;
