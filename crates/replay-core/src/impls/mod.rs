//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryStore**: テスト・開発用の DurableStore（障害注入あり）
//! - **FileStore**: ディレクトリに key ごとのファイルを置く DurableStore

pub mod file_store;
pub mod memory_store;

pub use self::file_store::FileStore;
pub use self::memory_store::InMemoryStore;
