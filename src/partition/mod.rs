//! Token-budget partitioning of changed files into review groups.
//!
//! Files are first split by whether a single-file request fits the
//! ceiling. Fitting files are kept together when possible, otherwise
//! grouped by extension, and over-budget extension buckets are filled
//! greedily in ascending token order. Files that do not fit alone are
//! retried with their removed lines stripped; any still too large are
//! dropped and reported.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::models::pr::{PrFile, ProcessGroup};

/// Counts model tokens in a piece of text.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count(&self, text: &str) -> usize {
        self(text)
    }
}

/// Rough token estimate for mixed prose and code.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}

/// Whitespace-separated words plus half the ASCII punctuation.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    word_count + punct_count / 2
}

/// Renders files into the prompt text whose size is budgeted.
pub trait PromptRenderer: Send + Sync {
    /// One file's section of the prompt.
    fn render_file(&self, file: &PrFile) -> String;

    /// The full request around already rendered file sections.
    fn join_sections(&self, sections: &[&str]) -> String {
        sections.join("\n")
    }

    /// The full request for a group of files.
    fn render_group(&self, files: &[PrFile]) -> String {
        let sections: Vec<String> = files.iter().map(|f| self.render_file(f)).collect();
        let sections: Vec<&str> = sections.iter().map(String::as_str).collect();
        self.join_sections(&sections)
    }
}

/// Outcome of partitioning: the groups to review and the files left out.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub groups: Vec<ProcessGroup>,
    pub dropped: Vec<PrFile>,
}

/// A file together with its section, rendered once per partitioning pass.
struct Rendered {
    file: PrFile,
    section: String,
}

#[derive(Debug, Clone)]
pub struct TokenBudgetPartitioner<C> {
    ceiling: usize,
    counter: C,
}

impl<C: TokenCounter> TokenBudgetPartitioner<C> {
    pub fn new(ceiling: usize, counter: C) -> Self {
        Self { ceiling, counter }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Split `files` into groups whose rendered prompt fits the ceiling.
    ///
    /// Every input file lands in exactly one group or in `dropped`.
    pub fn partition<R>(&self, files: Vec<PrFile>, renderer: &R) -> Partition
    where
        R: PromptRenderer + ?Sized,
    {
        let files: Vec<Rendered> = files
            .into_iter()
            .map(|f| self.render(f, renderer))
            .collect();

        let (within, outside): (Vec<Rendered>, Vec<Rendered>) = files
            .into_iter()
            .partition(|f| self.fits(std::slice::from_ref(f), renderer));
        info!(
            within = within.len(),
            outside = outside.len(),
            ceiling = self.ceiling,
            "partitioning files"
        );

        let mut groups = self.within_limit(within, renderer);
        let (outside_groups, dropped) = self.outside_limit(outside, renderer);
        groups.extend(outside_groups);

        Partition {
            groups: groups
                .into_iter()
                .map(|group| ProcessGroup::new(group.into_iter().map(|r| r.file).collect()))
                .collect(),
            dropped: dropped.into_iter().map(|r| r.file).collect(),
        }
    }

    fn render<R: PromptRenderer + ?Sized>(&self, mut file: PrFile, renderer: &R) -> Rendered {
        let section = renderer.render_file(&file);
        file.patch_token_length = Some(self.counter.count(&section));
        Rendered { file, section }
    }

    fn fits<R: PromptRenderer + ?Sized>(&self, files: &[Rendered], renderer: &R) -> bool {
        let sections: Vec<&str> = files.iter().map(|r| r.section.as_str()).collect();
        self.counter.count(&renderer.join_sections(&sections)) <= self.ceiling
    }

    /// Group files that each fit on their own.
    fn within_limit<R: PromptRenderer + ?Sized>(&self, files: Vec<Rendered>, renderer: &R) -> Vec<Vec<Rendered>> {
        if files.is_empty() {
            return Vec::new();
        }
        if self.fits(&files, renderer) {
            return vec![files];
        }

        let mut by_extension: IndexMap<String, Vec<Rendered>> = IndexMap::new();
        for rendered in files {
            by_extension
                .entry(rendered.file.extension().unwrap_or_default())
                .or_default()
                .push(rendered);
        }

        let mut groups = Vec::new();
        for (extension, mut bucket) in by_extension {
            if self.fits(&bucket, renderer) {
                debug!(extension = %extension, files = bucket.len(), "extension group fits");
                groups.push(bucket);
                continue;
            }

            debug!(extension = %extension, files = bucket.len(), "extension group exceeds ceiling, filling greedily");
            bucket.sort_by_key(|r| r.file.patch_token_length.unwrap_or(0));
            let mut current: Vec<Rendered> = Vec::new();
            for rendered in bucket {
                current.push(rendered);
                if current.len() > 1 && !self.fits(&current, renderer) {
                    let overflow = current.pop();
                    groups.push(std::mem::take(&mut current));
                    current.extend(overflow);
                }
            }
            if !current.is_empty() {
                groups.push(current);
            }
        }
        groups
    }

    /// Retry oversized files with removed lines stripped.
    fn outside_limit<R: PromptRenderer + ?Sized>(
        &self,
        files: Vec<Rendered>,
        renderer: &R,
    ) -> (Vec<Vec<Rendered>>, Vec<Rendered>) {
        if files.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let stripped: Vec<Rendered> = files
            .iter()
            .map(|r| self.render(r.file.strip_removed_lines(), renderer))
            .collect();
        if self.fits(&stripped, renderer) {
            return (vec![stripped], Vec::new());
        }

        let (fitting, too_large): (Vec<Rendered>, Vec<Rendered>) = stripped
            .into_iter()
            .partition(|r| self.fits(std::slice::from_ref(r), renderer));
        for rendered in &too_large {
            warn!(
                file = %rendered.file.filename,
                tokens = rendered.file.patch_token_length.unwrap_or(0),
                ceiling = self.ceiling,
                "file exceeds token ceiling even without removed lines, skipping"
            );
        }
        (self.within_limit(fitting, renderer), too_large)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Renders the patch verbatim; paired with a word counter each
    /// file's cost is its word count.
    struct PatchRenderer;

    impl PromptRenderer for PatchRenderer {
        fn render_file(&self, file: &PrFile) -> String {
            file.patch.clone()
        }
    }

    fn words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn file_with_cost(name: &str, cost: usize) -> PrFile {
        PrFile::new(name, vec!["w"; cost].join(" "))
    }

    fn names(partition: &Partition) -> Vec<Vec<&str>> {
        partition
            .groups
            .iter()
            .map(|g| g.files.iter().map(|f| f.filename.as_str()).collect())
            .collect()
    }

    #[test]
    fn everything_fits_in_one_group() {
        let partitioner = TokenBudgetPartitioner::new(1000, words);
        let files = vec![file_with_cost("a.ts", 10), file_with_cost("b.rs", 20)];
        let partition = partitioner.partition(files, &PatchRenderer);
        assert_eq!(names(&partition), vec![vec!["a.ts", "b.rs"]]);
        assert_eq!(partition.groups[0].token_length(), 30);
    }

    #[test]
    fn greedy_ascending_fill() {
        let partitioner = TokenBudgetPartitioner::new(250, words);
        let files: Vec<PrFile> = (0..5).map(|i| file_with_cost(&format!("f{i}.ts"), 100)).collect();
        let partition = partitioner.partition(files, &PatchRenderer);
        let sizes: Vec<Vec<usize>> = partition
            .groups
            .iter()
            .map(|g| g.files.iter().map(|f| f.patch_token_length.unwrap()).collect())
            .collect();
        assert_eq!(sizes, vec![vec![100, 100], vec![100, 100], vec![100]]);
        assert!(partition.dropped.is_empty());
    }

    #[test]
    fn extension_buckets_that_fit_stay_whole() {
        let partitioner = TokenBudgetPartitioner::new(100, words);
        let files = vec![
            file_with_cost("a.ts", 40),
            file_with_cost("a.rs", 60),
            file_with_cost("b.ts", 40),
            file_with_cost("b.rs", 30),
        ];
        let partition = partitioner.partition(files, &PatchRenderer);
        assert_eq!(names(&partition), vec![vec!["a.ts", "b.ts"], vec!["a.rs", "b.rs"]]);
    }

    #[test]
    fn over_budget_bucket_sorts_ascending() {
        let partitioner = TokenBudgetPartitioner::new(100, words);
        let files = vec![
            file_with_cost("big.ts", 90),
            file_with_cost("small.ts", 10),
            file_with_cost("mid.ts", 50),
        ];
        let partition = partitioner.partition(files, &PatchRenderer);
        assert_eq!(names(&partition), vec![vec!["small.ts", "mid.ts"], vec!["big.ts"]]);
    }

    #[test]
    fn oversized_file_is_stripped_and_kept() {
        let partitioner = TokenBudgetPartitioner::new(5, words);
        let file = PrFile::new("a.ts", "@@\n-one two three\n+four\n five");
        let partition = partitioner.partition(vec![file], &PatchRenderer);
        assert_eq!(partition.groups.len(), 1);
        assert_eq!(partition.groups[0].files[0].patch, "@@\n+four\n five");
        assert!(partition.dropped.is_empty());
    }

    #[test]
    fn file_too_large_after_stripping_is_dropped() {
        let partitioner = TokenBudgetPartitioner::new(3, words);
        let files = vec![
            PrFile::new("huge.ts", "+a b c d e f"),
            PrFile::new("ok.ts", "+a"),
        ];
        let partition = partitioner.partition(files, &PatchRenderer);
        assert_eq!(names(&partition), vec![vec!["ok.ts"]]);
        assert_eq!(partition.dropped.len(), 1);
        assert_eq!(partition.dropped[0].filename, "huge.ts");
    }

    #[test]
    fn no_group_exceeds_ceiling() {
        let partitioner = TokenBudgetPartitioner::new(120, words);
        let costs = [5, 80, 33, 119, 60, 61, 7, 200, 40];
        let files: Vec<PrFile> = costs
            .iter()
            .enumerate()
            .map(|(i, c)| file_with_cost(&format!("f{i}.{}", if i % 2 == 0 { "ts" } else { "js" }), *c))
            .collect();
        let partition = partitioner.partition(files, &PatchRenderer);
        for group in &partition.groups {
            assert!(words(&PatchRenderer.render_group(&group.files)) <= 120);
        }
        let placed: usize = partition.groups.iter().map(ProcessGroup::len).sum();
        assert_eq!(placed + partition.dropped.len(), costs.len());
        assert_eq!(partition.dropped.len(), 1);
    }

    /// Counts how often each file is rendered.
    struct CountingRenderer {
        renders: std::sync::Mutex<Vec<String>>,
    }

    impl PromptRenderer for CountingRenderer {
        fn render_file(&self, file: &PrFile) -> String {
            self.renders.lock().unwrap().push(file.filename.clone());
            file.patch.clone()
        }

        fn join_sections(&self, sections: &[&str]) -> String {
            format!("preamble\n{}", sections.join("\n"))
        }
    }

    #[test]
    fn each_file_is_rendered_once_and_overhead_counts_per_group() {
        let renderer = CountingRenderer {
            renders: std::sync::Mutex::new(Vec::new()),
        };
        let partitioner = TokenBudgetPartitioner::new(21, words);
        let files: Vec<PrFile> = (0..6).map(|i| file_with_cost(&format!("f{i}.ts"), 10)).collect();

        let partition = partitioner.partition(files, &renderer);

        // One word of preamble plus two ten-word files per group.
        assert_eq!(names(&partition), vec![vec!["f0.ts", "f1.ts"], vec!["f2.ts", "f3.ts"], vec!["f4.ts", "f5.ts"]]);
        assert_eq!(renderer.renders.lock().unwrap().len(), 6);
    }

    #[test]
    fn heuristic_counts_words_and_punctuation() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("let x = foo(bar);"), 4 + 2);
    }
}
