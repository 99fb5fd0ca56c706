//! Choosing one of several candidate outputs for the same decision.
//!
//! [`ActionVoter`] short-circuits when every candidate renders identically
//! and otherwise defers to a [`Judge`]. [`LlmJudge`] asks the model;
//! [`MajorityJudge`] picks the most frequent rendering without a model call.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::llm::{Choice, CompletionClient, CompletionRequest, LlmError};
use crate::prompts::{self, SelectionArgs};

#[derive(Error, Debug)]
pub enum VoteError {
    #[error("nothing to vote on")]
    NoCandidates,

    #[error("judge selected index {index} but there are only {options} options")]
    InvalidSelection { index: i64, options: usize },

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// What the candidates are for. Shapes the judge prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteTopic {
    /// Competing task breakdowns for a goal.
    Plan { goal: String },
    /// Competing next actions in a run.
    Action {
        goal: String,
        plan: String,
        summary: String,
    },
}

/// Picks the best of several rendered candidates.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Zero-based index into `options`.
    async fn select_best(&self, topic: &VoteTopic, options: &[String]) -> Result<usize, VoteError>;
}

/// Selects among candidates, skipping the judge on consensus.
#[derive(Clone)]
pub struct ActionVoter {
    judge: Arc<dyn Judge>,
}

impl ActionVoter {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self { judge }
    }

    /// Index of the winning candidate.
    pub async fn vote(&self, topic: &VoteTopic, candidates: &[String]) -> Result<usize, VoteError> {
        let Some(first) = candidates.first() else {
            return Err(VoteError::NoCandidates);
        };
        if candidates.iter().all(|c| c == first) {
            info!(candidates = candidates.len(), "candidates agree, skipping vote");
            return Ok(0);
        }

        let index = self.judge.select_best(topic, candidates).await?;
        if index >= candidates.len() {
            return Err(VoteError::InvalidSelection {
                index: index as i64,
                options: candidates.len(),
            });
        }
        info!(index, candidates = candidates.len(), "vote selected candidate");
        Ok(index)
    }
}

/// Judge backed by a forced selection function call.
///
/// One request asks for `votes` completions; the index with the most votes
/// wins, ties going to the lowest index.
pub struct LlmJudge {
    client: Arc<dyn CompletionClient>,
    votes: usize,
    temperature: f64,
}

impl LlmJudge {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            votes: 1,
            temperature: 0.0,
        }
    }

    pub fn with_votes(mut self, votes: usize, temperature: f64) -> Self {
        self.votes = votes.max(1);
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn select_best(&self, topic: &VoteTopic, options: &[String]) -> Result<usize, VoteError> {
        let (messages, function) = match topic {
            VoteTopic::Plan { goal } => (
                prompts::task_vote_messages(goal, options),
                prompts::task_vote_function(),
            ),
            VoteTopic::Action { goal, plan, summary } => (
                prompts::action_vote_messages(goal, plan, summary, options),
                prompts::action_vote_function(),
            ),
        };
        let name = function.name.clone();
        let request = CompletionRequest::new(messages)
            .force(function)
            .n(self.votes)
            .temperature(self.temperature);

        let choices = self.client.complete(request).await?;
        if choices.is_empty() {
            return Err(LlmError::NoFunctionCall(name).into());
        }

        let mut tally = vec![0usize; options.len()];
        for choice in &choices {
            let call = match choice {
                Choice::FunctionCall(call) if call.name == name => call,
                _ => return Err(LlmError::NoFunctionCall(name).into()),
            };
            let selection: SelectionArgs = call.parse_arguments()?;
            let index = usize::try_from(selection.index)
                .ok()
                .filter(|i| *i < options.len())
                .ok_or(VoteError::InvalidSelection {
                    index: selection.index,
                    options: options.len(),
                })?;
            debug!(index, reason = %selection.reason, "judge vote");
            tally[index] += 1;
        }
        Ok(first_max(&tally))
    }
}

/// Deterministic judge: the most frequent rendering wins, earliest on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityJudge;

#[async_trait]
impl Judge for MajorityJudge {
    async fn select_best(&self, _topic: &VoteTopic, options: &[String]) -> Result<usize, VoteError> {
        if options.is_empty() {
            return Err(VoteError::NoCandidates);
        }
        let mut counts: IndexMap<&str, (usize, usize)> = IndexMap::new();
        for (index, option) in options.iter().enumerate() {
            counts.entry(option.as_str()).or_insert((index, 0)).1 += 1;
        }
        let mut best = (0, 0);
        for (first_index, count) in counts.values().copied() {
            if count > best.1 {
                best = (first_index, count);
            }
        }
        Ok(best.0)
    }
}

/// Index of the first maximum.
fn first_max(tally: &[usize]) -> usize {
    let mut best = 0;
    for (index, votes) in tally.iter().enumerate() {
        if *votes > tally[best] {
            best = index;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJudge {
        calls: AtomicUsize,
        pick: usize,
    }

    #[async_trait]
    impl Judge for CountingJudge {
        async fn select_best(&self, _topic: &VoteTopic, _options: &[String]) -> Result<usize, VoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.pick)
        }
    }

    fn topic() -> VoteTopic {
        VoteTopic::Plan { goal: "goal".to_string() }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn identical_candidates_skip_the_judge() {
        let judge = Arc::new(CountingJudge { calls: AtomicUsize::new(0), pick: 2 });
        let voter = ActionVoter::new(judge.clone());
        let index = voter.vote(&topic(), &strings(&["same", "same", "same"])).await.unwrap();
        assert_eq!(index, 0);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn differing_candidates_ask_the_judge() {
        let judge = Arc::new(CountingJudge { calls: AtomicUsize::new(0), pick: 1 });
        let voter = ActionVoter::new(judge.clone());
        let index = voter.vote(&topic(), &strings(&["a", "b"])).await.unwrap();
        assert_eq!(index, 1);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn out_of_range_judge_pick_is_rejected() {
        let voter = ActionVoter::new(Arc::new(CountingJudge { calls: AtomicUsize::new(0), pick: 7 }));
        let err = voter.vote(&topic(), &strings(&["a", "b"])).await.unwrap_err();
        assert!(matches!(err, VoteError::InvalidSelection { index: 7, options: 2 }));
    }

    #[tokio::test]
    async fn empty_candidates_are_an_error() {
        let voter = ActionVoter::new(Arc::new(MajorityJudge));
        assert!(matches!(voter.vote(&topic(), &[]).await, Err(VoteError::NoCandidates)));
    }

    #[tokio::test]
    async fn majority_judge_prefers_frequent_then_first() {
        let options = strings(&["x", "y", "y", "x", "z"]);
        assert_eq!(MajorityJudge.select_best(&topic(), &options).await.unwrap(), 0);
        let options = strings(&["x", "y", "y"]);
        assert_eq!(MajorityJudge.select_best(&topic(), &options).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn llm_judge_tallies_votes() {
        let client = Arc::new(ScriptedClient::new().push_calls(vec![
            ("evaluateTaskList", json!({"index": 1, "reason": "shorter"})),
            ("evaluateTaskList", json!({"index": 0, "reason": "complete"})),
            ("evaluateTaskList", json!({"index": 1, "reason": "clearer"})),
        ]));
        let judge = LlmJudge::new(client.clone()).with_votes(3, 0.5);
        let index = judge.select_best(&topic(), &strings(&["a", "b"])).await.unwrap();
        assert_eq!(index, 1);

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].n, 3);
        assert_eq!(requests[0].forced_function(), Some("evaluateTaskList"));
        assert!(requests[0].messages[0].content.contains("Plan 1: b"));
    }

    #[tokio::test]
    async fn llm_judge_ties_go_to_lowest_index() {
        let client = Arc::new(ScriptedClient::new().push_calls(vec![
            ("evaluateAction", json!({"index": 2, "reason": ""})),
            ("evaluateAction", json!({"index": 1, "reason": ""})),
        ]));
        let judge = LlmJudge::new(client).with_votes(2, 0.5);
        let topic = VoteTopic::Action {
            goal: "g".to_string(),
            plan: "p".to_string(),
            summary: String::new(),
        };
        let index = judge.select_best(&topic, &strings(&["a", "b", "c"])).await.unwrap();
        assert_eq!(index, 1);
    }

    #[tokio::test]
    async fn llm_judge_text_reply_is_hard_failure() {
        let client = Arc::new(ScriptedClient::new().push_text("the first one"));
        let judge = LlmJudge::new(client.clone());
        let err = judge.select_best(&topic(), &strings(&["a", "b"])).await.unwrap_err();
        assert!(matches!(err, VoteError::Llm(LlmError::NoFunctionCall(_))));
        assert_eq!(client.request_count(), 1);
    }
}
