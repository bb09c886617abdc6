use std::collections::HashMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AppError;
use schema::ValidationError;

pub mod builtin;
pub mod context;
pub mod executor;
pub mod schema;

pub use context::{ExecutionContext, ProgressChannel, ToolEnv};

/// Observation handed back to the agent after a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Nothing to target. An expected condition, reported rather than raised:
    /// the call completes normally and the agent relays `message` to the user.
    /// `success` stays false because the requested action did not happen, which
    /// also marks the status message as not done.
    pub fn no_active_device() -> Self {
        Self {
            success: false,
            message: "No active device found. Please open Spotify on a device and start playing something."
                .to_string(),
            data: Some(json!({ "reason": "no_active_device" })),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| {
            json!({ "success": self.success, "message": self.message }).to_string()
        })
    }
}

/// A tool that takes a validated argument object.
#[async_trait]
pub trait ParameterizedTool: Send + Sync {
    type Params: DeserializeOwned + JsonSchema + Send + Sync + 'static;

    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    fn requires_active_device(&self) -> bool {
        false
    }

    /// Rules that span several fields. Runs with the schema checks, before
    /// anything else happens.
    fn check_params(&self, _params: &Self::Params) -> Result<(), ValidationError> {
        Ok(())
    }

    fn start_message(&self, _params: &Self::Params) -> String {
        format!("⏳ Running {}...", ParameterizedTool::name(self))
    }

    async fn execute(&self, env: &ToolEnv, params: Self::Params) -> anyhow::Result<ToolResult>;
}

/// A tool without arguments.
#[async_trait]
pub trait SimpleTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    fn requires_active_device(&self) -> bool {
        false
    }

    fn start_message(&self) -> String {
        format!("⏳ Running {}...", self.name())
    }

    async fn execute(&self, env: &ToolEnv) -> anyhow::Result<ToolResult>;
}

/// Object-safe face of [`ParameterizedTool`], implemented for every one of them.
#[async_trait]
pub trait DynParameterizedTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters_schema(&self) -> Value;
    async fn call(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolResult, AppError>;
}

#[async_trait]
impl<T: ParameterizedTool> DynParameterizedTool for T {
    fn name(&self) -> &'static str {
        ParameterizedTool::name(self)
    }

    fn description(&self) -> &'static str {
        ParameterizedTool::description(self)
    }

    fn parameters_schema(&self) -> Value {
        schema::schema_for::<T::Params>()
    }

    async fn call(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolResult, AppError> {
        executor::run_parameterized(self, args, ctx).await
    }
}

pub enum Tool {
    Parameterized(Box<dyn DynParameterizedTool>),
    Simple(Box<dyn SimpleTool>),
}

impl Tool {
    pub fn parameterized<T: ParameterizedTool + 'static>(tool: T) -> Self {
        Tool::Parameterized(Box::new(tool))
    }

    pub fn simple<T: SimpleTool + 'static>(tool: T) -> Self {
        Tool::Simple(Box::new(tool))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Parameterized(tool) => tool.name(),
            Tool::Simple(tool) => tool.name(),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tool::Parameterized(tool) => tool.description(),
            Tool::Simple(tool) => tool.description(),
        }
    }

    pub fn parameters_schema(&self) -> Value {
        match self {
            Tool::Parameterized(tool) => tool.parameters_schema(),
            Tool::Simple(_) => json!({ "type": "object", "properties": {} }),
        }
    }

    /// Function-calling definition sent to the LLM.
    pub fn definition(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters_schema()
            }
        })
    }

    pub async fn call(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolResult, AppError> {
        match self {
            Tool::Parameterized(tool) => tool.call(args, ctx).await,
            Tool::Simple(tool) => executor::run_simple(tool.as_ref(), ctx).await,
        }
    }

    /// Run the tool and render the result as the JSON string the agent reads.
    pub async fn invoke(&self, args: &Value, ctx: &ExecutionContext) -> Result<String, AppError> {
        self.call(args, ctx).await.map(|result| result.to_json())
    }
}

/// Tools available to the agent, in registration order.
#[derive(Default)]
pub struct ToolSet {
    tools: Vec<Tool>,
    index: HashMap<&'static str, usize>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Tool) -> anyhow::Result<()> {
        let name = tool.name();
        if self.index.contains_key(name) {
            anyhow::bail!("Tool '{}' is already registered", name);
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(Tool::name).collect()
    }

    pub fn definitions(&self) -> Vec<Value> {
        self.tools.iter().map(Tool::definition).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
