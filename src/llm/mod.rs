pub mod provider;

pub use provider::{create_oracle, GeminiProvider, OpenAICompatibleProvider, VisionOracle};
