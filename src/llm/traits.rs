//! 协作方接口：语言模型与嵌入
//!
//! 引擎只依赖这两个 trait；真实后端、Mock 与脚本化实现都在 llm 模块内。

use async_trait::async_trait;

use crate::llm::Message;

/// 累计 token 用量快照
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 给定系统指令与有序对话，返回一次原始回复文本（期望恰好一个步骤对象）
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    fn token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 空文本返回空向量
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
}
