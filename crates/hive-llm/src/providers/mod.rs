//! Vendor adapters

pub mod anthropic;
pub mod catalog;
pub mod compat;
pub mod google;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiChatProvider;
