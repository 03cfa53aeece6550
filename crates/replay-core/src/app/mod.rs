//! App - アプリケーション層
//!
//! ports を組み合わせて QueueManager を構築します。
//!
//! # 主要コンポーネント
//! - **QueueBuilder**: 依存の注入、設定の検証、ストアからの再読み込み

pub mod builder;

pub use self::builder::{BuildError, QueueBuilder};
