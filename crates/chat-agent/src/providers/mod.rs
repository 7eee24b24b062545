pub mod base;
pub mod errors;
pub mod mock;
pub mod openai;
pub mod utils;

pub use base::ModelCaller;
pub use openai::{ModelInfo, OpenAiCompatibleProvider};
