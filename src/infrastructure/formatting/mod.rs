//! Formatting backend adapters

pub mod dashscope;
pub mod gateway;

pub use dashscope::DashScopeFormatter;
pub use gateway::GatewayFormatter;
