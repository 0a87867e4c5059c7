//! 沙箱目录约束
//!
//! Sandbox 绑定根目录，目录切换先做词法归一化再做规范化（解析符号链接），
//! 两次都必须以根目录为前缀，否则 Access denied 且当前目录不变。
//! 其他命令的路径参数与重定向目标同样不得越出根目录。

use std::path::{Component, Path, PathBuf};

use crate::core::AgentError;

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// 根目录不存在时创建，并取规范路径
    pub fn new(root: impl AsRef<Path>) -> Result<Self, AgentError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| {
            AgentError::ConfigError(format!("Cannot create sandbox root {}: {}", root.display(), e))
        })?;
        let root = root.canonicalize().map_err(|e| {
            AgentError::ConfigError(format!("Cannot resolve sandbox root {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// 将 target 相对 cwd 解析为绝对路径（仅词法），越界返回 ToolRejected
    pub fn resolve(&self, cwd: &Path, target: &str) -> Result<PathBuf, AgentError> {
        let target = unquote(target.trim());
        let joined = if target.is_empty() || target == "~" {
            self.root.clone()
        } else {
            let t = Path::new(target);
            if t.is_absolute() {
                t.to_path_buf()
            } else {
                cwd.join(t)
            }
        };
        let normalized = normalize(&joined);
        if !self.contains(&normalized) {
            return Err(access_denied(&normalized));
        }
        Ok(normalized)
    }

    /// 切换目录：返回新的逻辑目录；越界或不存在时返回错误，调用方保持原目录
    pub fn change_dir(&self, cwd: &Path, target: &str) -> Result<PathBuf, AgentError> {
        let candidate = self.resolve(cwd, target)?;
        let canonical = candidate.canonicalize().map_err(|_| {
            AgentError::ToolExecution(format!("cd: no such directory: {}", candidate.display()))
        })?;
        if !self.contains(&canonical) {
            return Err(access_denied(&canonical));
        }
        if !canonical.is_dir() {
            return Err(AgentError::ToolExecution(format!(
                "cd: not a directory: {}",
                canonical.display()
            )));
        }
        Ok(canonical)
    }

    /// 检查命令中的路径参数与重定向目标
    ///
    /// 按空白切分做近似解析；`~` 开头或含 `$` 的路径无法静态确定，按越界处理。
    pub fn check_command_paths(&self, cwd: &Path, command: &str) -> Result<(), AgentError> {
        for operand in path_operands(command) {
            if operand.starts_with('~') || operand.contains('$') {
                return Err(AgentError::ToolRejected(format!(
                    "Access denied: cannot confine path {operand}"
                )));
            }
            if operand == "/dev/null" {
                continue;
            }
            let resolved = self.resolve(cwd, operand)?;
            self.check_existing_ancestor(&resolved)?;
        }
        Ok(())
    }

    /// 路径可能尚不存在：规范化最深的已存在祖先，挡住经符号链接的越界
    fn check_existing_ancestor(&self, path: &Path) -> Result<(), AgentError> {
        let Some(existing) = path.ancestors().find(|p| p.exists()) else {
            return Ok(());
        };
        match existing.canonicalize() {
            Ok(canonical) if !self.contains(&canonical) => Err(access_denied(&canonical)),
            _ => Ok(()),
        }
    }
}

/// 看起来像路径的参数：含 '/'、以 '~' 开头或为 ".."
fn path_operands(command: &str) -> Vec<&str> {
    command
        .split_whitespace()
        .filter_map(|token| {
            // `>out`、`2>>log`、`<in`
            let token = token.rsplit(|c: char| c == '>' || c == '<').next().unwrap_or(token);
            // `--out=dir/x`
            let token = match token.split_once('=') {
                Some((flag, value)) if flag.starts_with('-') => value,
                _ => token,
            };
            let token = token.trim_matches(|c: char| c == '"' || c == '\'');
            let path_like = token.contains('/') || token.starts_with('~') || token == "..";
            path_like.then_some(token)
        })
        .collect()
}

fn access_denied(path: &Path) -> AgentError {
    AgentError::ToolRejected(format!("Access denied outside sandbox: {}", path.display()))
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
        .unwrap_or(s)
}

/// 词法归一化：消去 . 与 ..（不访问文件系统）
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
