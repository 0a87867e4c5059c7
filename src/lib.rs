//! Hive - Rust 智能体执行引擎
//!
//! 模块划分：
//! - **agent**: 从配置装配引擎（LLM、工具、检索、检查点）
//! - **checkpoint**: 版本化检查点存储（内存 / JSONL / SQLite）与控制器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、恢复策略、会话与循环状态
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / Scripted）与嵌入
//! - **observability**: 日志初始化
//! - **react**: 步骤协议解析、Planner、主循环 Controller
//! - **retrieval**: 多查询扇出检索与结果融合（Union / RRF）
//! - **session**: 会话、Turn 与工具调用记录
//! - **tools**: 工具注册表、沙箱、安全策略与执行器

pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod react;
pub mod retrieval;
pub mod session;
pub mod tools;

pub use react::{Controller, TurnOutcome, TurnResult};
