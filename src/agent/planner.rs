//! Task breakdown: several candidate plans, one winner.

use std::sync::Arc;

use tracing::{debug, info};

use super::StepError;
use crate::llm::{Choice, CompletionClient, CompletionRequest};
use crate::prompts::{self, TaskBreakdownArgs};
use crate::vote::{ActionVoter, VoteTopic};

pub struct Planner {
    client: Arc<dyn CompletionClient>,
    voter: ActionVoter,
    candidates: usize,
    temperature: f64,
}

impl Planner {
    pub fn new(client: Arc<dyn CompletionClient>, voter: ActionVoter, candidates: usize, temperature: f64) -> Self {
        Self {
            client,
            voter,
            candidates,
            temperature,
        }
    }

    /// Ordered sub-goals for `goal`.
    pub async fn plan(&self, goal: &str) -> Result<Vec<String>, StepError> {
        let request = CompletionRequest::new(prompts::task_breakdown_messages(goal))
            .force(prompts::task_breakdown_function())
            .n(self.candidates)
            .temperature(self.temperature);
        let choices = self.client.complete(request).await?;

        let mut plans: Vec<Vec<String>> = Vec::with_capacity(choices.len());
        for choice in &choices {
            let Choice::FunctionCall(call) = choice else {
                debug!("plan candidate without a function call, skipping");
                continue;
            };
            match call.parse_arguments::<TaskBreakdownArgs>() {
                Ok(args) if !args.tasks.is_empty() => plans.push(args.tasks),
                Ok(_) => debug!("empty plan candidate, skipping"),
                Err(e) => debug!(error = %e, "malformed plan candidate, skipping"),
            }
        }
        if plans.is_empty() {
            return Err(StepError::NoCandidates);
        }

        let rendered: Vec<String> = plans.iter().map(|tasks| tasks.join(", ")).collect();
        let topic = VoteTopic::Plan {
            goal: goal.to_string(),
        };
        let winner = self.voter.vote(&topic, &rendered).await?;
        let plan = plans.swap_remove(winner);
        info!(tasks = plan.len(), candidates = rendered.len(), "plan adopted");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;
    use crate::vote::MajorityJudge;
    use serde_json::json;

    fn planner(client: Arc<ScriptedClient>) -> Planner {
        Planner::new(client, ActionVoter::new(Arc::new(MajorityJudge)), 3, 0.7)
    }

    #[tokio::test]
    async fn majority_plan_wins() {
        let client = Arc::new(ScriptedClient::new().push_calls(vec![
            ("taskBreakdown", json!({"tasks": ["write module"]})),
            ("taskBreakdown", json!({"tasks": ["add button", "wire click"]})),
            ("taskBreakdown", json!({"tasks": ["add button", "wire click"]})),
        ]));
        let plan = planner(client.clone()).plan("Add logout").await.unwrap();
        assert_eq!(plan, vec!["add button", "wire click"]);

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].n, 3);
        assert_eq!(requests[0].messages[1].content, "Task: Add logout");
    }

    #[tokio::test]
    async fn malformed_candidates_are_skipped() {
        let client = Arc::new(ScriptedClient::new().push_calls(vec![
            ("taskBreakdown", json!({"steps": ["nope"]})),
            ("taskBreakdown", json!({"tasks": ["only one"]})),
        ]));
        let plan = planner(client).plan("goal").await.unwrap();
        assert_eq!(plan, vec!["only one"]);
    }

    #[tokio::test]
    async fn no_usable_plan_is_an_error() {
        let client = Arc::new(ScriptedClient::new().push_text("I would start by..."));
        let err = planner(client).plan("goal").await.unwrap_err();
        assert!(matches!(err, StepError::NoCandidates));
    }
}
