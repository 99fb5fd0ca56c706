//! Markdown for structured review suggestions.

use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::hosting::Repository;
use crate::models::pr::ReviewSuggestion;

/// Longest issue link kept with its code block.
pub const MAX_ISSUE_URL_LEN: usize = 2048;

/// Characters left as-is in a URL query component.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode(text: &str) -> String {
    utf8_percent_encode(text, COMPONENT).to_string()
}

/// A pre-filled "new issue" link for a suggestion.
///
/// The code block is part of the body unless that pushes the URL past
/// [`MAX_ISSUE_URL_LEN`].
pub fn issue_link(repository: &Repository, title: &str, body: &str, code: Option<&str>) -> String {
    let base = format!(
        "{}/issues/new?title={}&body={}",
        repository.url(),
        encode(title),
        encode(body)
    );
    let url = match code {
        Some(code) => {
            let full = format!("{base}{}", encode(&format!("\n{code}\n")));
            if full.len() > MAX_ISSUE_URL_LEN { base } else { full }
        }
        None => base,
    };
    format!("[Create Issue]({url})")
}

fn render_one(repository: &Repository, suggestion: &ReviewSuggestion) -> String {
    let link = issue_link(
        repository,
        &suggestion.describe,
        &suggestion.comment,
        Some(&suggestion.code),
    );
    format!(
        "{}\n```\n{}\n```\n{link}\n",
        suggestion.comment, suggestion.code
    )
}

/// Suggestions grouped under a `## <file>` header per file, in first-seen
/// file order.
pub fn render_suggestions(repository: &Repository, suggestions: &[ReviewSuggestion]) -> String {
    let mut by_file: IndexMap<&str, Vec<&ReviewSuggestion>> = IndexMap::new();
    for suggestion in suggestions {
        by_file.entry(suggestion.filename.as_str()).or_default().push(suggestion);
    }
    by_file
        .into_iter()
        .map(|(file, group)| {
            let mut section = vec![format!("## {file}\n")];
            section.extend(group.into_iter().map(|s| render_one(repository, s)));
            section.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn suggestion(file: &str, comment: &str) -> ReviewSuggestion {
        ReviewSuggestion {
            describe: "Null check".to_string(),
            kind: "bug".to_string(),
            comment: comment.to_string(),
            code: "return a.b;".to_string(),
            filename: file.to_string(),
        }
    }

    #[test]
    fn link_encodes_components() {
        let repo = Repository::new("octo", "app");
        assert_eq!(
            issue_link(&repo, "Fix it (now)", "a & b", None),
            "[Create Issue](https://github.com/octo/app/issues/new?title=Fix%20it%20(now)&body=a%20%26%20b)"
        );
    }

    #[test]
    fn long_code_block_is_dropped_from_link() {
        let repo = Repository::new("octo", "app");
        let code = "x".repeat(MAX_ISSUE_URL_LEN);
        let link = issue_link(&repo, "t", "b", Some(&code));
        assert_eq!(link, "[Create Issue](https://github.com/octo/app/issues/new?title=t&body=b)");

        let short = issue_link(&repo, "t", "b", Some("y"));
        assert!(short.ends_with("body=b%0Ay%0A)"));
    }

    #[test]
    fn suggestions_grouped_per_file() {
        let repo = Repository::new("o", "r");
        let rendered = render_suggestions(
            &repo,
            &[
                suggestion("a.ts", "first"),
                suggestion("b.ts", "second"),
                suggestion("a.ts", "third"),
            ],
        );
        let headers: Vec<&str> = rendered.lines().filter(|l| l.starts_with("## ")).collect();
        assert_eq!(headers, vec!["## a.ts", "## b.ts"]);
        let first = rendered.find("first").unwrap();
        let third = rendered.find("third").unwrap();
        let b_header = rendered.find("## b.ts").unwrap();
        assert!(first < third && third < b_header);
    }

    #[test]
    fn nothing_to_render() {
        assert_eq!(render_suggestions(&Repository::new("o", "r"), &[]), "");
    }
}
