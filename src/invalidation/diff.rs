//! Changed-term extraction from a unified diff of a dictionary file.
//!
//! Several blocks can sit back to back in one file, so the scan tracks brace
//! depth from context and added lines to know which block an added
//! `"term" = "value"` line belongs to. Removed lines are not part of the new
//! file and do not move the depth.

use crate::translate::glossary::{parse_pair, section_open, DictionaryCategory};

/// Where a changed term was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionRef {
    Known(DictionaryCategory),
    /// The hunk started inside a block whose header is out of view.
    RequiresLookup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationFinding {
    pub term: String,
    pub section: SectionRef,
}

/// Block being read: its category (None for blocks that are not dictionaries)
/// and the current brace depth inside it.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    section: Option<SectionRef>,
    depth: i32,
}

impl Cursor {
    const TOP: Cursor = Cursor {
        section: None,
        depth: 0,
    };
}

/// Terms added or changed in the diff, deduplicated, in diff order.
pub fn find_changed_terms(diff: &str) -> Vec<InvalidationFinding> {
    let mut findings: Vec<InvalidationFinding> = Vec::new();
    let mut cursor = Cursor::TOP;
    let mut in_hunk = false;

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("@@") {
            in_hunk = true;
            cursor = hunk_start(rest);
            continue;
        }
        if !in_hunk || is_file_header(line) {
            in_hunk = in_hunk && !line.starts_with("diff ");
            continue;
        }

        let (added, content) = match line.as_bytes().first() {
            Some(b'+') => (true, &line[1..]),
            Some(b' ') => (false, &line[1..]),
            None => (false, ""),
            // removed lines and "\ No newline at end of file"
            _ => continue,
        };

        if let Some(name) = section_open(content) {
            cursor = Cursor {
                section: DictionaryCategory::from_section_name(name).map(SectionRef::Known),
                depth: 1,
            };
            continue;
        }

        if added && cursor.depth > 0 {
            if let (Some(section), Some((term, _))) = (cursor.section, parse_pair(content)) {
                let seen = findings
                    .iter()
                    .any(|f| f.section == section && f.term.eq_ignore_ascii_case(&term));
                if !seen {
                    findings.push(InvalidationFinding { term, section });
                }
            }
        }

        cursor.depth += brace_delta(content);
        if cursor.depth <= 0 {
            cursor = Cursor::TOP;
        }
    }
    findings
}

fn is_file_header(line: &str) -> bool {
    line.starts_with("diff ")
        || line.starts_with("index ")
        || line.starts_with("--- ")
        || line.starts_with("+++ ")
        || line.starts_with("new file mode")
        || line.starts_with("deleted file mode")
}

/// State at the start of a hunk. Git puts the nearest enclosing declaration
/// after the second `@@` when it can find one.
fn hunk_start(header_rest: &str) -> Cursor {
    let context = header_rest
        .split_once("@@")
        .map(|(_, ctx)| ctx.trim())
        .unwrap_or("");
    match section_open(context) {
        Some(name) => Cursor {
            section: DictionaryCategory::from_section_name(name).map(SectionRef::Known),
            depth: 1,
        },
        None => Cursor {
            section: Some(SectionRef::RequiresLookup),
            depth: 1,
        },
    }
}

/// Net `{` minus `}` outside of quoted strings and comments.
fn brace_delta(content: &str) -> i32 {
    let mut delta = 0;
    let mut in_string = false;
    let mut escaped = false;
    for c in content.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '#' => break,
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}
