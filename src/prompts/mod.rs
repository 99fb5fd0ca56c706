//! Prompt text and function schemas for every model interaction.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::FunctionSpec;
use crate::models::action::{DoneArgs, EditArgs, EditMode, OpenArgs, lenient_line};
use crate::models::{ChatMessage, ReviewSuggestion};

// ── Planning ────────────────────────────────────────────────────────

const TASK_BREAKDOWN_PROMPT: &str = "\
Break the given task into small, self-contained sub-tasks that a developer can pick up one at a time.

The developer can do two things:
1. Create a new file.
2. Modify an existing file.

Write a plan that takes the work from start to finish, including wiring any new code into the existing code.

Do not write code. Describe the changes at the level of \"add a class with these methods\" rather than spelling out every line.
Leave out testing, verification, saving and version control steps.";

/// Arguments of the `taskBreakdown` function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TaskBreakdownArgs {
    /// Sub-tasks that together accomplish the task, in order.
    pub tasks: Vec<String>,
}

pub fn task_breakdown_messages(task: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(TASK_BREAKDOWN_PROMPT),
        ChatMessage::user(format!("Task: {task}")),
    ]
}

pub fn task_breakdown_function() -> FunctionSpec {
    FunctionSpec::new::<TaskBreakdownArgs>("taskBreakdown", "Processes a list of tasks")
}

// ── Coding agent ────────────────────────────────────────────────────

const CODE_AGENT_PROMPT: &str = "\
You are an expert developer.

- You are given a goal to accomplish in a code repository.
- You output exactly one action at a time.
- You may be given the layout of the project as a file tree.
- When editing, output complete lines of code including leading whitespace.
- Never include line numbers in the code you write.
- Consider the whole file when editing. Your change must not break the surrounding code.
- The available actions are open, edit and done.
- Only respond with one of the actions OPEN, EDIT or DONE.
- Call DONE once the goal is complete.";

pub fn code_agent_messages(goal: &str, tree: &str, tasks: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CODE_AGENT_PROMPT),
        ChatMessage::user(format!(
            "Goal:\n{goal}\n\nPlan:\n{}\n\nTree: {tree}",
            tasks.join("\n")
        )),
    ]
}

/// The `done`, `open` and `edit` functions offered at every step.
pub fn agent_functions() -> Vec<FunctionSpec> {
    vec![
        FunctionSpec::new::<DoneArgs>("done", "Marks the provided goal as done"),
        FunctionSpec::new::<OpenArgs>("open", "Get the contents of the given filepath"),
        FunctionSpec::new::<EditArgs>(
            "edit",
            "Inserts or overwrites at the specified lines of the given file with the provided code",
        ),
    ]
}

// ── Voting ──────────────────────────────────────────────────────────

const TASK_VOTE_PROMPT: &str = "Determine which plan is best to achieve the goal.";

const ACTION_VOTE_PROMPT: &str = "\
Determine which action is best to take to achieve or get closer to the goal.
Goal:
{GOAL}
Here is the proposed plan to achieve that goal:
{PLAN}

Here is a summary of your actions so far:
{SUMMARY}

Here are the options:
{OPTIONS}

Respond with your reasoning and the zero-based index of the action most likely to get you closer to the goal.";

/// Arguments of the judge's selection function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SelectionArgs {
    /// Zero-based index of the chosen option.
    #[serde(deserialize_with = "lenient_line")]
    #[schemars(with = "i64")]
    pub index: i64,
    /// Why this option was chosen over the rest.
    #[serde(default)]
    pub reason: String,
}

/// `options` are already-rendered plans.
pub fn task_vote_messages(goal: &str, options: &[String]) -> Vec<ChatMessage> {
    let plans = options
        .iter()
        .enumerate()
        .map(|(i, plan)| format!("Plan {i}: {plan}"))
        .collect::<Vec<_>>()
        .join("\n");
    vec![ChatMessage::system(format!("{TASK_VOTE_PROMPT}\nGoal: {goal}\n{plans}"))]
}

pub fn task_vote_function() -> FunctionSpec {
    FunctionSpec::new::<SelectionArgs>(
        "evaluateTaskList",
        "Returns the index of the best plan in the zero-based list that is most likely to accomplish the given goal",
    )
}

pub fn action_vote_messages(goal: &str, plan: &str, summary: &str, options: &[String]) -> Vec<ChatMessage> {
    let labeled = options
        .iter()
        .enumerate()
        .map(|(i, option)| format!("{i}: {option}"))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = ACTION_VOTE_PROMPT
        .replace("{GOAL}", goal)
        .replace("{PLAN}", plan)
        .replace("{SUMMARY}", summary)
        .replace("{OPTIONS}", &labeled);
    vec![ChatMessage::system(prompt)]
}

pub fn action_vote_function() -> FunctionSpec {
    FunctionSpec::new::<SelectionArgs>(
        "evaluateAction",
        "Returns the index of the best option in the zero-based list that is most likely to get you closer towards accomplishing the goal",
    )
}

// ── Edit repair ─────────────────────────────────────────────────────

const REPAIR_PROMPT: &str = "\
You are a seasoned developer looking at a file that no longer parses. Find the cause of the error and fix it.

Choose \"insert\" mode to add code without touching existing lines, or \"overwrite\" mode to replace the broken lines.

1. Read the file and the parse error and work out what causes the error.
2. Provide the corrected code for the mode you chose.";

/// Arguments of the `repair` function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RepairArgs {
    /// Either "insert" or "overwrite".
    pub mode: EditMode,
    /// The code to place at the start line.
    pub code: String,
    /// 1-based line where the change starts.
    #[serde(rename = "lineStart", deserialize_with = "lenient_line")]
    #[schemars(with = "i64")]
    pub line_start: i64,
}

/// `numbered_file` already carries `N: ` prefixes.
pub fn repair_messages(numbered_file: &str, error: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(REPAIR_PROMPT),
        ChatMessage::user(format!("{numbered_file}\n\n{error}")),
    ]
}

pub fn repair_function() -> FunctionSpec {
    FunctionSpec::new::<RepairArgs>("repair", "Fix for the parser error in the file")
}

// ── Review ──────────────────────────────────────────────────────────

const REVIEW_PROMPT: &str = "\
You are a pull request reviewer. Give constructive, concise feedback on the diff and meaningful code suggestions.

The diff is grouped by file under `## <filename>` headers. Each change is shown inside its enclosing function when one exists, or inside a window of surrounding lines:

## src/file1.ts

@@ -12,5 +12,5 @@
line that already existed in the file
-line removed in the pull request
+line added in the pull request
 line that already existed in the file

Focus on the new code (lines starting with '+').

- Prioritise bugs and correctness problems, then performance, security, modularity and best practice.
- Do not suggest something the pull request already does.
- Do not suggest docstrings, type hints or comments.
- Keep suggestions in the same programming language as the code.";

const STRUCTURED_REVIEW_SUFFIX: &str = "\

Report your review through the `review` function: a short overall comment plus one entry per suggestion naming the file and the code it refers to.";

/// Arguments of the `review` function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReviewArgs {
    /// Overall feedback on the changes.
    pub review: String,
    #[serde(default)]
    pub suggestions: Vec<ReviewSuggestion>,
}

pub fn review_messages(diff: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(REVIEW_PROMPT), ChatMessage::user(diff)]
}

pub fn structured_review_messages(diff: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!("{REVIEW_PROMPT}{STRUCTURED_REVIEW_SUFFIX}")),
        ChatMessage::user(diff),
    ]
}

pub fn review_function() -> FunctionSpec {
    FunctionSpec::new::<ReviewArgs>("review", "Structured review of the pull request diff")
}

const INLINE_FIX_PROMPT: &str = "\
You are given a review suggestion and the full contents of the file it applies to, with line numbers. Write the exact code fix for the suggestion.

The suggestion looks like this:

<suggestion>
  <describe>Short description</describe>
  <type>Category</type>
  <comment>What should change</comment>
  <code>The code the suggestion refers to</code>
  <filename>The file</filename>
</suggestion>

Follow the instructions in the comment. The fix replaces the lines starting at the line you give, so include only the affected lines. Once spliced into the file, the result must be valid code. Never use placeholders such as 'rest of code...'.";

/// Arguments of the `fix` function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FixArgs {
    /// Why this change improves the code.
    pub comment: String,
    /// The replacement code.
    pub code: String,
    /// 1-based first line the fix replaces.
    #[serde(rename = "lineStart", deserialize_with = "lenient_line")]
    #[schemars(with = "i64")]
    pub line_start: i64,
}

pub fn inline_fix_messages(file_contents: &str, suggestion: &ReviewSuggestion) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(INLINE_FIX_PROMPT),
        ChatMessage::user(format!(
            "{}\n\n{}",
            render_suggestion(suggestion),
            number_lines(file_contents)
        )),
    ]
}

pub fn fix_function() -> FunctionSpec {
    FunctionSpec::new::<FixArgs>("fix", "The code fix to address the suggestion and rectify the issue")
}

// ── Rendering helpers ───────────────────────────────────────────────

/// Prefix every line with its 1-based number: `N: line`.
pub fn number_lines(contents: &str) -> String {
    contents
        .split('\n')
        .enumerate()
        .map(|(i, line)| format!("{}: {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_suggestion(suggestion: &ReviewSuggestion) -> String {
    [
        "<suggestion>".to_string(),
        format!("  <describe>{}</describe>", suggestion.describe),
        format!("  <type>{}</type>", suggestion.kind),
        format!("  <comment>{}</comment>", suggestion.comment),
        format!("  <code>{}</code>", suggestion.code),
        format!("  <filename>{}</filename>", suggestion.filename),
        "</suggestion>".to_string(),
    ]
    .join("\n")
}
