//! 认知层：步骤协议解析、Planner、主循环控制器

pub mod controller;
pub mod planner;
pub mod step;

pub use controller::{Controller, TurnOutcome, TurnResult};
pub use planner::{build_system_prompt, render_turn, Planner};
pub use step::{extract_json, parse_step, step_schema_json, ModelStep, StepObject};
