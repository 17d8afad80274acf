// Hive DIE - Dynamic Intelligence Engine
//
// Builds the final prompt for every agent call: three-tier contextual
// memory with self-compression, structured templates with placeholder
// substitution, and model-family adaptation.

pub mod generator;
pub mod memory;
pub mod template;

pub use generator::{model_family, ModelFamily, PromptGenerator};
pub use memory::{ContextualMemory, MemoryTier, DEFAULT_COMPRESS_THRESHOLD};
pub use template::{substitute, PromptTemplate};
