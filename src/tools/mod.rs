pub mod confirm;
pub mod executor;
pub mod human;
pub mod policy;
pub mod registry;
pub mod result;
pub mod runner;
pub mod sandbox;
pub mod shell;

pub use confirm::{Confirmer, ConsoleInput, FixedConfirmer, StdinConfirmer};
pub use executor::{Dispatch, ToolExecutor};
pub use human::HumanAssistanceTool;
pub use policy::{default_dangerous_patterns, default_safe_prefixes, Classification, SafetyPolicy, SafetyVerdict};
pub use registry::{Tool, ToolContext, ToolDescriptor, ToolRegistry, ToolSafety};
pub use result::{CommandRecord, ToolOutcome, ToolResult, ToolStatus};
pub use runner::{shell_argv, CommandOutput, CommandRunner, ShellRunner};
pub use sandbox::Sandbox;
pub use shell::RunCommandsTool;
