//! 会话层：Turn 记录、工具调用记录、中断记录

pub mod invocation;
#[allow(clippy::module_inception)]
pub mod session;
pub mod turn;

pub use invocation::{InvocationStatus, PendingInterrupt, ToolInvocation};
pub use session::Session;
pub use turn::{payload, Payload, Role, StepKind, Turn};
