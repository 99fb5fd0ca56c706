//! Integration tests for prompt context construction.
//!
//! These drive the context builder the way the review pipeline does: base
//! contents reconstructed from a local working tree and a unified diff.

use pretty_assertions::assert_eq;

use patchwise::context::{ContextStrategy, PatchContextBuilder};
use patchwise::diff::parse_unified_diff;
use patchwise::hosting::local::BASE_REF;
use patchwise::hosting::{HostingClient, LocalWorkspace, PullRequestEvent};
use patchwise::models::pr::PrFile;
use patchwise::scope::ScopeRegistry;

/// Forty lines with `function foo` spanning lines 5 to 20.
fn foo_source(edited: bool) -> Vec<String> {
    let mut lines = vec![
        "import { x } from './x';".to_string(),
        String::new(),
        "const a = 1;".to_string(),
        String::new(),
        "function foo() {".to_string(),
    ];
    for n in 6..=19 {
        if edited && n == 12 {
            lines.push("  const v12 = 120;".to_string());
            lines.push("  const v12b = 121;".to_string());
        } else {
            lines.push(format!("  const v{n} = {n};"));
        }
    }
    lines.push("}".to_string());
    for n in 21..=40 {
        lines.push(format!("const c{n} = {n};"));
    }
    lines
}

const FOO_PATCH: &str = "@@ -11,3 +11,4 @@\n   const v11 = 11;\n-  const v12 = 12;\n+  const v12 = 120;\n+  const v12b = 121;\n   const v13 = 13;";

#[test]
fn change_inside_function_renders_whole_function() {
    let old = foo_source(false);
    assert_eq!(old.len(), 40);
    let file = PrFile {
        old_contents: Some(format!("{}\n", old.join("\n"))),
        ..PrFile::new("src/foo.js", FOO_PATCH)
    };

    let rendered = PatchContextBuilder::default().build_context(&file);

    let updated = foo_source(true);
    let mut expected = vec!["## src/foo.js".to_string(), String::new(), "@@ -11,3 +11,4 @@".to_string()];
    // Updated lines 5..=21, with the change shown as diff lines.
    for (index, line) in updated[4..21].iter().enumerate() {
        let number = index + 5;
        match number {
            12 => {
                expected.push("-  const v12 = 12;".to_string());
                expected.push(format!("+{line}"));
            }
            13 => expected.push(format!("+{line}")),
            _ => expected.push(line.clone()),
        }
    }
    assert_eq!(rendered, expected.join("\n"));
    assert!(!rendered.contains("const c21"));
    assert!(!rendered.contains("const a = 1;"));
}

#[test]
fn expanded_strategy_shows_window_of_original() {
    let old = foo_source(false);
    let file = PrFile {
        old_contents: Some(format!("{}\n", old.join("\n"))),
        ..PrFile::new("src/foo.js", FOO_PATCH)
    };

    let rendered = PatchContextBuilder::new(ScopeRegistry::default(), 2).build(&file, ContextStrategy::Expanded);

    assert_eq!(
        rendered,
        [
            "## src/foo.js",
            "",
            "  const v9 = 9;",
            "  const v10 = 10;",
            "@@ -11,3 +11,4 @@",
            "   const v11 = 11;",
            "-  const v12 = 12;",
            "+  const v12 = 120;",
            "+  const v12b = 121;",
            "   const v13 = 13;",
            "  const v14 = 14;",
            "  const v15 = 15;",
        ]
        .join("\n")
    );
}

#[test]
fn unparsable_base_falls_back_to_expansion() {
    let old = "function broken( {\n  return 1;\n}\n";
    let file = PrFile {
        old_contents: Some(old.to_string()),
        ..PrFile::new("src/broken.js", "@@ -2,1 +2,1 @@\n-  return 1;\n+  return 2;")
    };

    let scoped = PatchContextBuilder::new(ScopeRegistry::default(), 1).build_context(&file);
    let expanded = PatchContextBuilder::new(ScopeRegistry::default(), 1).build(&file, ContextStrategy::Expanded);

    assert_eq!(scoped, expanded);
    assert_eq!(
        scoped,
        "## src/broken.js\n\nfunction broken( {\n@@ -2,1 +2,1 @@\n-  return 1;\n+  return 2;\n}"
    );
}

#[tokio::test]
async fn local_workspace_supplies_base_for_context() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("src/foo.js"),
        format!("{}\n", foo_source(true).join("\n")),
    )
    .unwrap();
    let diff = format!(
        "diff --git a/src/foo.js b/src/foo.js\n--- a/src/foo.js\n+++ b/src/foo.js\n{FOO_PATCH}\n"
    );
    let ws = LocalWorkspace::new(dir.path()).with_changes(parse_unified_diff(&diff));
    let pr = PullRequestEvent {
        repository: ws.repository().clone(),
        number: 1,
        title: "edit foo".to_string(),
        base_ref: BASE_REF.to_string(),
        head_ref: "HEAD".to_string(),
    };

    let mut files = ws.list_pr_files(&pr).await.unwrap();
    assert_eq!(files.len(), 1);
    let file = &mut files[0];
    file.old_contents = ws.fetch_file(&file.filename, BASE_REF).await.unwrap();

    assert_eq!(
        file.old_contents.as_deref(),
        Some(format!("{}\n", foo_source(false).join("\n")).as_str())
    );
    let rendered = PatchContextBuilder::default().build_context(file);
    assert!(rendered.starts_with("## src/foo.js\n\n@@ -11,3 +11,4 @@\nfunction foo() {"));
}
