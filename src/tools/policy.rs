//! 命令安全策略：白名单前缀 + 危险关键字
//!
//! 先匹配危险关键字（一律拒绝），再匹配白名单前缀（直接执行），两者都不命中则需要人工确认。
//! 关键字匹配可被混淆绕过；含管道 / 分号 / 命令替换的命令不享受白名单。

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 安全判定
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyVerdict {
    Allowed,
    NeedsConfirmation,
    Rejected,
}

/// 分类结果；Rejected 时带上命中的关键字
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub verdict: SafetyVerdict,
    pub matched: Option<String>,
}

/// 使白名单失效的 shell 元字符
const CHAINING_TOKENS: &[&str] = &[";", "|", "`", "$(", "||"];

pub fn default_safe_prefixes() -> Vec<String> {
    ["ls", "cat", "echo", "touch", "mkdir", "pwd"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn default_dangerous_patterns() -> Vec<String> {
    [
        "rm", "shutdown", "reboot", "poweroff", "kill", "pkill", "dd", "mkfs", "chmod 777",
        "chown", "curl", "wget", "scp", "mv /", "rmdir", "sudo", "systemctl", "service",
        "iptables", "ufw", "mount", "umount", "forkbomb", ":(){ :|:& };:", "eval", "exec",
        "python -c", "node -e",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    safe_prefixes: Vec<String>,
    dangerous: Vec<(String, Regex)>,
}

impl SafetyPolicy {
    pub fn new(safe_prefixes: Vec<String>, dangerous_patterns: Vec<String>) -> Result<Self, AgentError> {
        let dangerous = dangerous_patterns
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                let re = keyword_regex(p.trim())
                    .map_err(|e| AgentError::ConfigError(format!("bad pattern '{p}': {e}")))?;
                Ok((p, re))
            })
            .collect::<Result<Vec<_>, AgentError>>()?;
        let safe_prefixes = safe_prefixes
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Self {
            safe_prefixes,
            dangerous,
        })
    }

    pub fn classify(&self, command: &str) -> Classification {
        let command = command.trim();
        for (keyword, re) in &self.dangerous {
            if re.is_match(command) {
                return Classification {
                    verdict: SafetyVerdict::Rejected,
                    matched: Some(keyword.clone()),
                };
            }
        }
        let chained = CHAINING_TOKENS.iter().any(|t| command.contains(t));
        if !chained && self.has_safe_prefix(command) {
            return Classification {
                verdict: SafetyVerdict::Allowed,
                matched: None,
            };
        }
        Classification {
            verdict: SafetyVerdict::NeedsConfirmation,
            matched: None,
        }
    }

    fn has_safe_prefix(&self, command: &str) -> bool {
        let lower = command.to_lowercase();
        self.safe_prefixes.iter().any(|prefix| {
            lower
                .strip_prefix(prefix.as_str())
                .map(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
                .unwrap_or(false)
        })
    }
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::new(default_safe_prefixes(), default_dangerous_patterns())
            .unwrap_or_else(|_| Self {
                safe_prefixes: default_safe_prefixes(),
                dangerous: Vec::new(),
            })
    }
}

/// 关键字两端若是字母数字则加词边界，避免 "rm" 命中 "format"
fn keyword_regex(keyword: &str) -> Result<Regex, regex::Error> {
    let starts_word = keyword.chars().next().is_some_and(|c| c.is_alphanumeric());
    let ends_word = keyword.chars().last().is_some_and(|c| c.is_alphanumeric());
    let mut pattern = String::from("(?i)");
    if starts_word {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(keyword));
    if ends_word {
        pattern.push_str(r"\b");
    }
    Regex::new(&pattern)
}
