//! LLM 层：语言模型与嵌入协作方（OpenAI 兼容 / DeepSeek / Mock / Scripted）

pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

pub use message::{Message, MessageRole};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{resolve_api_key, OpenAiClient, OpenAiEmbedder, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use traits::{EmbeddingProvider, LlmClient, TokenUsage};
