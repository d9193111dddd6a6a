//! Parsers for the two `git merge-tree` output formats.
//!
//! Modern git (>= 2.38) exposes `merge-tree --write-tree`, whose exit code
//! distinguishes clean (0) from conflicted (1) merges and whose stdout lists
//! stage entries followed by informational messages. Older git only has the
//! legacy three-argument `merge-tree <base> <ours> <theirs>`, which always
//! exits 0 and describes conflicts through `changed/added/removed in both`
//! blocks. Both parsers are pure and converge on [`MergeTreeResult`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Reserved all-zero object identifier meaning "absent on this side".
pub const ZERO_OID: &str = "0000000000000000000000000000000000000000";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One file that would conflict, with its per-stage object identifiers.
///
/// Identity is `filepath`; a snapshot holds at most one entry per path.
/// An oid equal to [`ZERO_OID`] means that side has no content for the
/// file (e.g. a file added independently on both sides has no base).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictFileEntry {
    pub filepath: String,
    pub base_oid: String,
    pub ours_oid: String,
    pub theirs_oid: String,
}

impl ConflictFileEntry {
    fn absent(filepath: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            base_oid: ZERO_OID.into(),
            ours_oid: ZERO_OID.into(),
            theirs_oid: ZERO_OID.into(),
        }
    }
}

/// Uniform structural result of a merge simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeTreeResult {
    pub has_conflicts: bool,
    /// Top-level tree identifier; empty when the format does not provide one.
    pub toplevel_tree_oid: String,
    /// Ordered by first appearance of each distinct path in the input.
    pub conflict_files: Vec<ConflictFileEntry>,
    /// Free-text lines after the structured section (modern format only).
    pub messages: Vec<String>,
}

impl MergeTreeResult {
    fn clean(toplevel_tree_oid: String) -> Self {
        Self {
            has_conflicts: false,
            toplevel_tree_oid,
            conflict_files: Vec::new(),
            messages: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage accumulation
// ---------------------------------------------------------------------------

/// Ordered mapping from filepath to a partially filled entry, finalized
/// into a sequence preserving first-appearance order.
#[derive(Default)]
struct StageAccumulator {
    order: Vec<String>,
    entries: HashMap<String, ConflictFileEntry>,
}

impl StageAccumulator {
    fn entry_mut(&mut self, filepath: &str) -> &mut ConflictFileEntry {
        if !self.entries.contains_key(filepath) {
            self.order.push(filepath.to_string());
            self.entries
                .insert(filepath.to_string(), ConflictFileEntry::absent(filepath));
        }
        self.entries.get_mut(filepath).expect("entry just inserted")
    }

    fn into_files(mut self) -> Vec<ConflictFileEntry> {
        self.order
            .iter()
            .filter_map(|path| self.entries.remove(path))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Modern format
// ---------------------------------------------------------------------------

/// Parse `git merge-tree --write-tree` output.
///
/// Exit code 0 means clean: the first line is the written tree oid and any
/// remaining text is ignored. Exit code 1 means conflicts: the first line is
/// still the tree oid, followed by stage lines of the shape
/// `<mode> <40-hex> <stage>\t<path>` until the first blank line, after which
/// the remaining non-blank lines are informational messages. A stage-section
/// line that does not match the shape is preserved as a message rather than
/// failing the parse.
pub fn parse_merge_tree_modern(output: &str, exit_code: i32) -> MergeTreeResult {
    if output.trim().is_empty() {
        return MergeTreeResult::clean(String::new());
    }

    let mut lines = output.lines();
    let toplevel = lines.next().map(str::trim).unwrap_or("").to_string();

    if exit_code != 1 {
        return MergeTreeResult::clean(toplevel);
    }

    let mut acc = StageAccumulator::default();
    let mut messages = Vec::new();
    let mut in_messages = false;

    for line in lines {
        if in_messages {
            if !line.trim().is_empty() {
                messages.push(line.to_string());
            }
            continue;
        }
        if line.trim().is_empty() {
            in_messages = true;
            continue;
        }
        match parse_stage_line(line) {
            Some((oid, stage, filepath)) => {
                let entry = acc.entry_mut(filepath);
                match stage {
                    1 => entry.base_oid = oid.to_string(),
                    2 => entry.ours_oid = oid.to_string(),
                    3 => entry.theirs_oid = oid.to_string(),
                    _ => unreachable!("stage validated in parse_stage_line"),
                }
            }
            None => messages.push(line.to_string()),
        }
    }

    let conflict_files = acc.into_files();
    MergeTreeResult {
        has_conflicts: !conflict_files.is_empty(),
        toplevel_tree_oid: toplevel,
        conflict_files,
        messages,
    }
}

/// Split a modern stage line into `(oid, stage, filepath)`.
fn parse_stage_line(line: &str) -> Option<(&str, u8, &str)> {
    let (meta, filepath) = line.split_once('\t')?;
    if filepath.is_empty() {
        return None;
    }
    let mut fields = meta.split_whitespace();
    let _mode = fields.next()?;
    let oid = fields.next()?;
    let stage = fields.next()?;
    if fields.next().is_some() || !is_oid(oid) {
        return None;
    }
    let stage: u8 = stage.parse().ok()?;
    if !(1..=3).contains(&stage) {
        return None;
    }
    Some((oid, stage, filepath))
}

fn is_oid(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Legacy format
// ---------------------------------------------------------------------------

/// Parse legacy three-argument `git merge-tree` output.
///
/// Conflicting files appear in blocks introduced by a `changed in both` /
/// `added in both` / `removed in both` header, each followed by indented
/// content lines `<base|our|their> <mode> <40-hex> <path>`. A block ends at
/// a blank line or any non-indented line, which may itself be the next
/// header. Text before the first header is ignored. This format carries
/// neither a tree identifier nor trailing messages.
pub fn parse_merge_tree_legacy(output: &str) -> MergeTreeResult {
    let mut acc = StageAccumulator::default();
    let mut in_block = false;

    for line in output.lines() {
        if is_legacy_header(line) {
            in_block = true;
            continue;
        }
        if !in_block {
            continue;
        }
        if line.trim().is_empty() {
            in_block = false;
            continue;
        }
        if !line.starts_with([' ', '\t']) {
            // Non-indented, non-header line terminates the block.
            in_block = false;
            continue;
        }
        match parse_side_line(line) {
            Some((side, oid, filepath)) => {
                let entry = acc.entry_mut(filepath);
                match side {
                    "base" => entry.base_oid = oid.to_string(),
                    "our" => entry.ours_oid = oid.to_string(),
                    "their" => entry.theirs_oid = oid.to_string(),
                    _ => unreachable!("side validated in parse_side_line"),
                }
            }
            None => warn!(line, "skipping unrecognized merge-tree content line"),
        }
    }

    let conflict_files = acc.into_files();
    MergeTreeResult {
        has_conflicts: !conflict_files.is_empty(),
        toplevel_tree_oid: String::new(),
        conflict_files,
        messages: Vec::new(),
    }
}

fn is_legacy_header(line: &str) -> bool {
    matches!(
        line.trim_end(),
        "changed in both" | "added in both" | "removed in both"
    )
}

/// Split a legacy content line into `(side, oid, filepath)`. The filepath is
/// everything after the third token, so paths with spaces survive.
fn parse_side_line(line: &str) -> Option<(&str, &str, &str)> {
    let mut rest = line.trim_start();
    let mut tokens = [""; 3];
    for token in tokens.iter_mut() {
        let end = rest.find(char::is_whitespace)?;
        *token = &rest[..end];
        rest = rest[end..].trim_start();
    }
    let [side, _mode, oid] = tokens;
    if !matches!(side, "base" | "our" | "their") || !is_oid(oid) || rest.is_empty() {
        return None;
    }
    Some((side, oid, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(ch: char) -> String {
        ch.to_string().repeat(40)
    }

    // -- modern -------------------------------------------------------------

    #[test]
    fn test_modern_clean_exit_zero() {
        let output = format!("{}\nsome trailing noise\n", oid('f'));
        let result = parse_merge_tree_modern(&output, 0);
        assert!(!result.has_conflicts);
        assert_eq!(result.toplevel_tree_oid, oid('f'));
        assert!(result.conflict_files.is_empty());
        assert!(result.messages.is_empty());
    }

    #[test]
    fn test_modern_empty_input_is_clean_at_either_exit_code() {
        for exit_code in [0, 1] {
            let result = parse_merge_tree_modern("", exit_code);
            assert!(!result.has_conflicts);
            assert_eq!(result.toplevel_tree_oid, "");
            assert!(result.conflict_files.is_empty());
        }
    }

    #[test]
    fn test_modern_single_file_all_stages() {
        // Scenario A from the detection contract.
        let output = format!(
            "{top}\n100644 {a} 1\tf.txt\n100644 {b} 2\tf.txt\n100644 {c} 3\tf.txt\n",
            top = oid('0'),
            a = oid('a'),
            b = oid('b'),
            c = oid('c'),
        );
        let result = parse_merge_tree_modern(&output, 1);
        assert!(result.has_conflicts);
        assert_eq!(result.conflict_files.len(), 1);
        let entry = &result.conflict_files[0];
        assert_eq!(entry.filepath, "f.txt");
        assert_eq!(entry.base_oid, oid('a'));
        assert_eq!(entry.ours_oid, oid('b'));
        assert_eq!(entry.theirs_oid, oid('c'));
    }

    #[test]
    fn test_modern_missing_base_stage_leaves_sentinel() {
        // Scenario B: both sides added the file, no common ancestor.
        let output = format!(
            "{top}\n100644 {b} 2\tf.txt\n100644 {c} 3\tf.txt\n",
            top = oid('0'),
            b = oid('b'),
            c = oid('c'),
        );
        let result = parse_merge_tree_modern(&output, 1);
        assert!(result.has_conflicts);
        assert_eq!(result.conflict_files[0].base_oid, ZERO_OID);
        assert_eq!(result.conflict_files[0].ours_oid, oid('b'));
    }

    #[test]
    fn test_modern_first_appearance_order_preserved() {
        let output = format!(
            "{top}\n\
             100644 {a} 2\tzebra.txt\n\
             100644 {b} 2\talpha.txt\n\
             100644 {c} 3\tzebra.txt\n\
             100644 {d} 3\talpha.txt\n",
            top = oid('0'),
            a = oid('a'),
            b = oid('b'),
            c = oid('c'),
            d = oid('d'),
        );
        let result = parse_merge_tree_modern(&output, 1);
        let paths: Vec<&str> = result
            .conflict_files
            .iter()
            .map(|f| f.filepath.as_str())
            .collect();
        assert_eq!(paths, vec!["zebra.txt", "alpha.txt"]);
    }

    #[test]
    fn test_modern_messages_after_blank_line() {
        let output = format!(
            "{top}\n100644 {a} 2\tf.txt\n\nAuto-merging f.txt\n\nCONFLICT (content): Merge conflict in f.txt\n",
            top = oid('0'),
            a = oid('a'),
        );
        let result = parse_merge_tree_modern(&output, 1);
        assert_eq!(result.conflict_files.len(), 1);
        // Blank lines inside the trailing section are skipped, not preserved.
        assert_eq!(
            result.messages,
            vec![
                "Auto-merging f.txt".to_string(),
                "CONFLICT (content): Merge conflict in f.txt".to_string(),
            ]
        );
    }

    #[test]
    fn test_modern_malformed_stage_line_becomes_message() {
        let output = format!(
            "{top}\nnot a stage line at all\n100644 {a} 2\tf.txt\n100644 short 3\tg.txt\n",
            top = oid('0'),
            a = oid('a'),
        );
        let result = parse_merge_tree_modern(&output, 1);
        assert_eq!(result.conflict_files.len(), 1);
        assert_eq!(result.conflict_files[0].filepath, "f.txt");
        assert_eq!(
            result.messages,
            vec![
                "not a stage line at all".to_string(),
                "100644 short 3\tg.txt".to_string(),
            ]
        );
    }

    #[test]
    fn test_modern_stage_out_of_range_rejected() {
        let output = format!("{top}\n100644 {a} 4\tf.txt\n", top = oid('0'), a = oid('a'));
        let result = parse_merge_tree_modern(&output, 1);
        assert!(!result.has_conflicts);
        assert_eq!(result.messages.len(), 1);
    }

    #[test]
    fn test_modern_path_with_spaces() {
        let output = format!(
            "{top}\n100644 {a} 2\tdir with spaces/my file.txt\n",
            top = oid('0'),
            a = oid('a'),
        );
        let result = parse_merge_tree_modern(&output, 1);
        assert_eq!(result.conflict_files[0].filepath, "dir with spaces/my file.txt");
    }

    #[test]
    fn test_modern_parse_is_idempotent() {
        let output = format!(
            "{top}\n100644 {a} 1\tf.txt\n100644 {b} 2\tf.txt\n\nmsg\n",
            top = oid('0'),
            a = oid('a'),
            b = oid('b'),
        );
        let first = parse_merge_tree_modern(&output, 1);
        let second = parse_merge_tree_modern(&output, 1);
        assert_eq!(first, second);
    }

    // -- legacy -------------------------------------------------------------

    fn legacy_block(header: &str, lines: &[(&str, String, &str)]) -> String {
        let mut out = format!("{header}\n");
        for (side, oid, path) in lines {
            out.push_str(&format!("  {side} 100644 {oid} {path}\n"));
        }
        out
    }

    #[test]
    fn test_legacy_changed_in_both() {
        let output = legacy_block(
            "changed in both",
            &[
                ("base", oid('a'), "f.txt"),
                ("our", oid('b'), "f.txt"),
                ("their", oid('c'), "f.txt"),
            ],
        );
        let result = parse_merge_tree_legacy(&output);
        assert!(result.has_conflicts);
        assert_eq!(result.conflict_files.len(), 1);
        let entry = &result.conflict_files[0];
        assert_eq!(entry.base_oid, oid('a'));
        assert_eq!(entry.ours_oid, oid('b'));
        assert_eq!(entry.theirs_oid, oid('c'));
    }

    #[test]
    fn test_legacy_added_in_both_has_sentinel_base() {
        let output = legacy_block(
            "added in both",
            &[("our", oid('b'), "new.txt"), ("their", oid('c'), "new.txt")],
        );
        let result = parse_merge_tree_legacy(&output);
        assert_eq!(result.conflict_files[0].base_oid, ZERO_OID);
    }

    #[test]
    fn test_legacy_no_tree_oid_and_no_messages_ever() {
        let output = format!(
            "merged\n  result 100644 {a} f.txt\n{}",
            legacy_block("changed in both", &[("our", oid('b'), "f.txt")]),
            a = oid('a'),
        );
        let result = parse_merge_tree_legacy(&output);
        assert_eq!(result.toplevel_tree_oid, "");
        assert!(result.messages.is_empty());
    }

    #[test]
    fn test_legacy_preamble_before_first_header_ignored() {
        let output = format!(
            "some unrelated output\n  indented noise 123\n{}",
            legacy_block("changed in both", &[("our", oid('b'), "f.txt")]),
        );
        let result = parse_merge_tree_legacy(&output);
        assert_eq!(result.conflict_files.len(), 1);
        assert_eq!(result.conflict_files[0].filepath, "f.txt");
    }

    #[test]
    fn test_legacy_back_to_back_headers() {
        let mut output = legacy_block("changed in both", &[("our", oid('b'), "f.txt")]);
        // Next block begins immediately with no blank line between.
        output.push_str(&legacy_block(
            "added in both",
            &[("their", oid('c'), "g.txt")],
        ));
        let result = parse_merge_tree_legacy(&output);
        let paths: Vec<&str> = result
            .conflict_files
            .iter()
            .map(|f| f.filepath.as_str())
            .collect();
        assert_eq!(paths, vec!["f.txt", "g.txt"]);
    }

    #[test]
    fn test_legacy_grouping_across_blocks() {
        // Stage lines for one path split across two blocks still build a
        // single entry.
        let mut output = legacy_block("changed in both", &[("base", oid('a'), "f.txt")]);
        output.push('\n');
        output.push_str(&legacy_block(
            "changed in both",
            &[("our", oid('b'), "f.txt"), ("their", oid('c'), "f.txt")],
        ));
        let result = parse_merge_tree_legacy(&output);
        assert_eq!(result.conflict_files.len(), 1);
        assert_eq!(result.conflict_files[0].base_oid, oid('a'));
        assert_eq!(result.conflict_files[0].theirs_oid, oid('c'));
    }

    #[test]
    fn test_legacy_block_ends_at_non_indented_line() {
        let output = format!(
            "{}merge result follows\n  our 100644 {d} ignored.txt\n",
            legacy_block("changed in both", &[("our", oid('b'), "f.txt")]),
            d = oid('d'),
        );
        let result = parse_merge_tree_legacy(&output);
        assert_eq!(result.conflict_files.len(), 1);
        assert_eq!(result.conflict_files[0].filepath, "f.txt");
    }

    #[test]
    fn test_legacy_removed_in_both_content_lines_accumulate() {
        // Such blocks usually carry no content lines; any that do appear are
        // treated like any other block's.
        let output = legacy_block("removed in both", &[("base", oid('a'), "gone.txt")]);
        let result = parse_merge_tree_legacy(&output);
        assert_eq!(result.conflict_files.len(), 1);
        assert_eq!(result.conflict_files[0].base_oid, oid('a'));
        assert_eq!(result.conflict_files[0].ours_oid, ZERO_OID);
    }

    #[test]
    fn test_legacy_path_with_spaces() {
        let output = legacy_block("changed in both", &[("our", oid('b'), "a b/c d.txt")]);
        let result = parse_merge_tree_legacy(&output);
        assert_eq!(result.conflict_files[0].filepath, "a b/c d.txt");
    }

    #[test]
    fn test_legacy_empty_input() {
        let result = parse_merge_tree_legacy("");
        assert!(!result.has_conflicts);
        assert!(result.conflict_files.is_empty());
    }
}
