//! The one execution path every tool call goes through.
//!
//! validate -> announce -> connect -> resolve device -> run -> classify ->
//! finalize status -> result. The status message is finalized on every path
//! that got past validation; the returned result never depends on whether a
//! progress channel was attached.

use std::future::Future;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::schema::parse_params;
use super::{ExecutionContext, ParameterizedTool, SimpleTool, ToolEnv, ToolResult};
use crate::error::{AppError, ErrorContext};

pub async fn run_parameterized<T: ParameterizedTool>(
    tool: &T,
    args: &Value,
    ctx: &ExecutionContext,
) -> Result<ToolResult, AppError> {
    let name = tool.name();
    let schema = super::schema::schema_for::<T::Params>();
    let params: T::Params = parse_params(&schema, args)
        .and_then(|params| tool.check_params(&params).map(|_| params))
        .map_err(|e| {
            warn!("Tool: {} rejected arguments for user {}: {}", name, ctx.user_id, e);
            AppError::from(e).with_context(ErrorContext::new(ctx.user_id.clone(), name))
        })?;

    let start_message = tool.start_message(&params);
    run_tool(name, tool.requires_active_device(), start_message, ctx, |env| async move {
        tool.execute(&env, params).await
    })
    .await
}

pub async fn run_simple(tool: &dyn SimpleTool, ctx: &ExecutionContext) -> Result<ToolResult, AppError> {
    run_tool(
        tool.name(),
        tool.requires_active_device(),
        tool.start_message(),
        ctx,
        |env| async move { tool.execute(&env).await },
    )
    .await
}

async fn run_tool<F, Fut>(
    name: &str,
    requires_active_device: bool,
    start_message: String,
    ctx: &ExecutionContext,
    call: F,
) -> Result<ToolResult, AppError>
where
    F: FnOnce(ToolEnv) -> Fut + Send,
    Fut: Future<Output = anyhow::Result<ToolResult>> + Send,
{
    info!("Tool: Executing {} for user {}", name, ctx.user_id);
    announce(ctx, &start_message).await;

    let outcome = execute_steps(name, requires_active_device, ctx, call)
        .await
        .map_err(|e| e.with_context(ErrorContext::new(ctx.user_id.clone(), name)));

    match &outcome {
        Ok(result) => {
            info!("Tool: {} finished for user {} (success={})", name, ctx.user_id, result.success);
            debug!("Tool: {} result: {}", name, result.message);
        }
        Err(e) => error!(
            user_id = %ctx.user_id,
            operation = name,
            kind = %e.kind,
            "Tool: {} failed: {}",
            name,
            e.message
        ),
    }

    finalize(ctx, &outcome).await;
    outcome
}

async fn execute_steps<F, Fut>(
    name: &str,
    requires_active_device: bool,
    ctx: &ExecutionContext,
    call: F,
) -> Result<ToolResult, AppError>
where
    F: FnOnce(ToolEnv) -> Fut + Send,
    Fut: Future<Output = anyhow::Result<ToolResult>> + Send,
{
    let error_context = || ErrorContext::new(ctx.user_id.clone(), name);
    let spotify = ctx.connector.connect(&ctx.user_id).await?;

    let device = if requires_active_device {
        match spotify.find_active_device().await {
            Ok(Some(device)) => Some(device),
            Ok(None) => {
                warn!("Tool: {} found no active device for user {}", name, ctx.user_id);
                return Ok(ToolResult::no_active_device());
            }
            Err(e) => return Err(AppError::classify(e.into(), error_context())),
        }
    } else {
        None
    };

    call(ToolEnv::new(spotify, device))
        .await
        .map_err(|e| AppError::classify(e, error_context()))
}

async fn announce(ctx: &ExecutionContext, text: &str) {
    let Some(progress) = &ctx.progress else {
        return;
    };
    if let Err(e) = progress
        .messenger
        .create_status_message(&ctx.user_id, progress.chat_id, text)
        .await
    {
        warn!("Tool: could not post status message for user {}: {:#}", ctx.user_id, e);
    }
}

/// Errors here are logged and dropped; they must not replace the outcome.
async fn finalize(ctx: &ExecutionContext, outcome: &Result<ToolResult, AppError>) {
    let Some(progress) = &ctx.progress else {
        return;
    };
    let text = match outcome {
        Ok(result) if result.success => format!("✅ {}", result.message),
        Ok(result) => format!("⚠️ {}", result.message),
        Err(e) => format!("❌ {}", e.user_message()),
    };
    if let Err(e) = progress
        .messenger
        .finalize_status_message(&ctx.user_id, progress.chat_id, &text)
        .await
    {
        warn!("Tool: could not finalize status message for user {}: {:#}", ctx.user_id, e);
    }
}
