//! Chat adapters

pub mod console;

pub use console::ConsoleChat;
