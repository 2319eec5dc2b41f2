//! Metadata index for the neko object store.
//!
//! A single-file SQLite database in WAL mode. Writers are serialized by
//! SQLite itself; every public repository operation is one transaction, and
//! the name-search index is kept consistent with the `files` table through
//! triggers installed by the migrations.

mod chunks;
mod files;

pub use chunks::ChunkRepository;
pub use files::FileRepository;
