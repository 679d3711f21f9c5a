//! Publishing to every selected platform

use super::{HandlerEnv, HandlerError, HandlerPolicy, HandlerResult, StateHandler};
use crate::config::EngineConfig;
use crate::runtime::traits::PostAsset;
use crate::state_machine::{
    Context, ContextUpdate, Input, OutboundMessage, PlatformOutcome, PlatformResult, Schedule,
    Transition, WorkflowState,
};
use async_trait::async_trait;
use futures::future::join_all;

/// Publishes once, on entry; every platform is tried independently
pub struct PostExecutionHandler;

#[async_trait]
impl StateHandler for PostExecutionHandler {
    fn state(&self) -> WorkflowState {
        WorkflowState::PostExecution
    }

    fn policy(&self, config: &EngineConfig) -> HandlerPolicy {
        HandlerPolicy::publishing(config)
    }

    async fn handle(&self, ctx: &Context, input: &Input, env: &HandlerEnv) -> HandlerResult {
        if *input != Input::Enter {
            return Err(HandlerError::invalid(
                "This post has already been submitted.",
            ));
        }

        let (Some(caption), Some(schedule)) = (ctx.final_caption(), ctx.schedule) else {
            return Err(HandlerError::Internal(
                "publishing without caption or schedule".into(),
            ));
        };
        let asset = match &ctx.rendered_asset {
            Some(rendered) => PostAsset {
                caption: rendered.caption.clone(),
                media_url: Some(rendered.url.clone()),
            },
            None => PostAsset {
                caption: caption.to_string(),
                media_url: None,
            },
        };

        let attempts = ctx.platforms.iter().map(|&platform| {
            let asset = &asset;
            async move {
                let outcome = match tokio::time::timeout(
                    env.config.publish_timeout,
                    env.publisher.publish(platform, asset, &schedule),
                )
                .await
                {
                    Ok(Ok(receipt)) => PlatformOutcome::Published {
                        reference: receipt.reference,
                    },
                    Ok(Err(e)) => PlatformOutcome::Failed {
                        reason: e.to_string(),
                    },
                    Err(_) => PlatformOutcome::Failed {
                        reason: format!(
                            "timed out after {}s",
                            env.config.publish_timeout.as_secs()
                        ),
                    },
                };
                tracing::info!(
                    platform = platform.as_str(),
                    success = matches!(outcome, PlatformOutcome::Published { .. }),
                    "Publish attempt finished"
                );
                PlatformResult { platform, outcome }
            }
        });
        let results = join_all(attempts).await;

        let failed: Vec<_> = results
            .iter()
            .filter_map(|r| match &r.outcome {
                PlatformOutcome::Failed { reason } => Some((r.platform, reason.clone())),
                PlatformOutcome::Published { .. } => None,
            })
            .collect();
        let summary = summarize(&results, &schedule);

        Ok(Transition::stay(WorkflowState::PostExecution)
            .with_update(ContextUpdate::SetPostResults(results))
            .with_message(OutboundMessage::text(summary))
            .with_failed_platforms(failed))
    }
}

fn summarize(results: &[PlatformResult], schedule: &Schedule) -> String {
    let verb = match schedule {
        Schedule::Immediate => "published".to_string(),
        Schedule::At { .. } => format!("scheduled for {schedule}"),
    };
    let mut lines = vec!["📣 Post summary:".to_string()];
    for result in results {
        lines.push(match &result.outcome {
            PlatformOutcome::Published { reference } => {
                format!("✅ {}: {verb} ({reference})", result.platform)
            }
            PlatformOutcome::Failed { reason } => {
                format!("❌ {}: failed ({reason})", result.platform)
            }
        });
    }
    lines.join("\n")
}
