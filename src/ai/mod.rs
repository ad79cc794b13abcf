pub mod credentials;
pub mod gemini;
pub mod http_client;
pub mod openai;
pub mod policy;
pub mod prompts;
pub mod provider;

pub use credentials::*;
pub use gemini::{GeminiClient, GeminiConfig};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use policy::*;
pub use provider::*;
