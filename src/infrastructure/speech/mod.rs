//! Speech recognition adapters

pub mod dashscope;

pub use dashscope::DashScopeSpeech;
