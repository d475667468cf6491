//! Step resolution.
//!
//! Combines the outcomes of classification and execution into exactly one
//! [`NextStep`] verdict per turn. The decision order is fixed: interruption,
//! then handoff, then the agent's tool-use completion policy, then — only
//! for turns that produced no work at all — a plain assistant message as
//! candidate final output.

use serde_json::Value;
use std::sync::Arc;

use crate::agent::{Agent, ToolUseBehavior};
use crate::error::Result;
use crate::items::ToolApprovalItem;
use crate::tool::ToolContext;

use super::execute::TurnOutput;

/// The verdict for one turn.
#[derive(Debug)]
pub enum NextStep {
    /// The run is complete with this output.
    FinalOutput {
        /// The final output value (a string for text agents, parsed JSON for
        /// structured agents).
        output: Value,
    },
    /// Feed the turn's results back to the model and run again.
    RunAgain,
    /// Control transfers to a new agent.
    Handoff {
        /// The agent now in control.
        new_agent: Arc<Agent>,
    },
    /// The run is suspended awaiting approval decisions.
    Interruption {
        /// The unresolved approval requests.
        approvals: Vec<ToolApprovalItem>,
    },
}

/// Resolve one turn into a verdict.
///
/// `message_text` is the turn's last assistant message, if any; `had_work`
/// is whether classification found anything actionable. A turn that produced
/// tool calls, handoffs, or approval requests never treats a bare assistant
/// message as final — the model must see the results first.
///
/// # Errors
///
/// Propagates custom-resolver failures and structured-output validation
/// failures (fatal, not retried).
pub(crate) async fn resolve_step(
    agent: &Agent,
    ctx: &ToolContext,
    message_text: Option<&str>,
    turn: TurnOutput,
    had_work: bool,
) -> Result<NextStep> {
    if !turn.interruptions.is_empty() {
        return Ok(NextStep::Interruption {
            approvals: turn.interruptions,
        });
    }

    if let Some(new_agent) = turn.handoff {
        return Ok(NextStep::Handoff { new_agent });
    }

    if !turn.function_results.is_empty() {
        match agent.tool_use_policy() {
            ToolUseBehavior::RunLlmAgain => return Ok(NextStep::RunAgain),
            ToolUseBehavior::StopOnFirstTool => {
                if let Some(first) = turn.function_results.first() {
                    return Ok(NextStep::FinalOutput {
                        output: Value::String(first.output.render()),
                    });
                }
            }
            ToolUseBehavior::StopAtTools(names) => {
                if let Some(stop) = turn
                    .function_results
                    .iter()
                    .find(|r| names.contains(&r.name))
                {
                    return Ok(NextStep::FinalOutput {
                        output: Value::String(stop.output.render()),
                    });
                }
                return Ok(NextStep::RunAgain);
            }
            ToolUseBehavior::Custom(resolver) => {
                let verdict = resolver(ctx.clone(), turn.function_results.clone()).await?;
                return Ok(match verdict {
                    Some(output) => NextStep::FinalOutput { output },
                    None => NextStep::RunAgain,
                });
            }
        }
    }

    if !had_work {
        if let Some(text) = message_text {
            let output = match agent.declared_output_schema() {
                Some(schema) => schema.parse(text)?,
                None => Value::String(text.to_owned()),
            };
            return Ok(NextStep::FinalOutput { output });
        }
    }

    Ok(NextStep::RunAgain)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::agent::OutputSchema;
    use crate::error::{Error, ModelBehaviorError};
    use crate::items::ToolOutput;
    use crate::tool::FunctionCallResult;
    use serde_json::json;

    fn ctx() -> ToolContext {
        ToolContext::new("run_1", "assistant", 1)
    }

    fn result(name: &str, text: &str) -> FunctionCallResult {
        FunctionCallResult {
            call_id: "c1".into(),
            name: name.into(),
            output: ToolOutput::Text { text: text.into() },
        }
    }

    fn approval() -> ToolApprovalItem {
        ToolApprovalItem {
            agent: "assistant".into(),
            kind: crate::items::ApprovalKind::Function,
            call_id: Some("c1".into()),
            name: "delete_file".into(),
            arguments: json!({}),
            source_call_id: None,
        }
    }

    #[tokio::test]
    async fn interruption_takes_precedence() {
        let agent = Agent::new("a");
        let turn = TurnOutput {
            interruptions: vec![approval()],
            handoff: Some(Arc::new(Agent::new("b"))),
            function_results: vec![result("lookup", "sunny")],
            tools_used: vec![],
        };
        let step = resolve_step(&agent, &ctx(), Some("done"), turn, true)
            .await
            .unwrap();
        assert!(matches!(step, NextStep::Interruption { .. }));
    }

    #[tokio::test]
    async fn handoff_beats_tool_policy() {
        let agent = Agent::new("a").tool_use_behavior(ToolUseBehavior::StopOnFirstTool);
        let turn = TurnOutput {
            handoff: Some(Arc::new(Agent::new("b"))),
            function_results: vec![result("lookup", "sunny")],
            ..TurnOutput::default()
        };
        let step = resolve_step(&agent, &ctx(), None, turn, true).await.unwrap();
        assert!(matches!(step, NextStep::Handoff { .. }));
    }

    #[tokio::test]
    async fn run_llm_again_is_default_after_tools() {
        let agent = Agent::new("a");
        let turn = TurnOutput {
            function_results: vec![result("lookup", "sunny")],
            ..TurnOutput::default()
        };
        let step = resolve_step(&agent, &ctx(), None, turn, true).await.unwrap();
        assert!(matches!(step, NextStep::RunAgain));
    }

    #[tokio::test]
    async fn stop_on_first_tool_finishes_with_output_text() {
        let agent = Agent::new("a").tool_use_behavior(ToolUseBehavior::StopOnFirstTool);
        let turn = TurnOutput {
            function_results: vec![result("lookup", "sunny"), result("lookup", "rainy")],
            ..TurnOutput::default()
        };
        let step = resolve_step(&agent, &ctx(), None, turn, true).await.unwrap();
        match step {
            NextStep::FinalOutput { output } => assert_eq!(output, json!("sunny")),
            _ => panic!("expected final output"),
        }
    }

    #[tokio::test]
    async fn stop_at_tools_only_matches_listed_names() {
        let agent =
            Agent::new("a").tool_use_behavior(ToolUseBehavior::StopAtTools(vec!["finish".into()]));

        let other = TurnOutput {
            function_results: vec![result("lookup", "sunny")],
            ..TurnOutput::default()
        };
        let step = resolve_step(&agent, &ctx(), None, other, true).await.unwrap();
        assert!(matches!(step, NextStep::RunAgain));

        let listed = TurnOutput {
            function_results: vec![result("lookup", "sunny"), result("finish", "done")],
            ..TurnOutput::default()
        };
        let step = resolve_step(&agent, &ctx(), None, listed, true).await.unwrap();
        match step {
            NextStep::FinalOutput { output } => assert_eq!(output, json!("done")),
            _ => panic!("expected final output"),
        }
    }

    #[tokio::test]
    async fn custom_resolver_is_authoritative() {
        let agent = Agent::new("a").tool_use_behavior(ToolUseBehavior::Custom(Arc::new(
            |_, results| {
                Box::pin(async move {
                    Ok(results
                        .iter()
                        .find(|r| r.output.render().contains("sunny"))
                        .map(|r| Value::String(r.output.render())))
                })
            },
        )));
        let turn = TurnOutput {
            function_results: vec![result("lookup", "sunny")],
            ..TurnOutput::default()
        };
        let step = resolve_step(&agent, &ctx(), None, turn, true).await.unwrap();
        assert!(matches!(step, NextStep::FinalOutput { .. }));
    }

    #[tokio::test]
    async fn message_with_work_never_finishes_the_turn() {
        let agent = Agent::new("a");
        let turn = TurnOutput::default();
        // Work happened (e.g. computer actions) even though no function
        // results were recorded.
        let step = resolve_step(&agent, &ctx(), Some("all done"), turn, true)
            .await
            .unwrap();
        assert!(matches!(step, NextStep::RunAgain));
    }

    #[tokio::test]
    async fn bare_message_is_final_for_text_agents() {
        let agent = Agent::new("a");
        let step = resolve_step(&agent, &ctx(), Some("hello"), TurnOutput::default(), false)
            .await
            .unwrap();
        match step {
            NextStep::FinalOutput { output } => assert_eq!(output, json!("hello")),
            _ => panic!("expected final output"),
        }
    }

    #[tokio::test]
    async fn structured_output_is_parsed() {
        let agent =
            Agent::new("a").output_schema(OutputSchema::new("weather", json!({"type": "object"})));
        let step = resolve_step(
            &agent,
            &ctx(),
            Some(r#"{"city": "Paris", "forecast": "sunny"}"#),
            TurnOutput::default(),
            false,
        )
        .await
        .unwrap();
        match step {
            NextStep::FinalOutput { output } => assert_eq!(output["forecast"], "sunny"),
            _ => panic!("expected final output"),
        }
    }

    #[tokio::test]
    async fn invalid_structured_output_is_fatal() {
        let agent =
            Agent::new("a").output_schema(OutputSchema::new("weather", json!({"type": "object"})));
        let err = resolve_step(&agent, &ctx(), Some("sunny"), TurnOutput::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ModelBehavior(ModelBehaviorError::InvalidStructuredOutput { .. })
        ));
    }

    #[tokio::test]
    async fn no_message_and_no_work_runs_again() {
        let agent = Agent::new("a");
        let step = resolve_step(&agent, &ctx(), None, TurnOutput::default(), false)
            .await
            .unwrap();
        assert!(matches!(step, NextStep::RunAgain));
    }
}
