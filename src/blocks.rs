//! Segmenting markdown into typed content blocks.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// Default cap on the size of a file read into memory (10 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Lines longer than this are never scanned for links.
pub const MAX_LINE_LENGTH: usize = 100_000;

/// Default markdown link pattern: `[text](target)`.
pub const DEFAULT_LINK_PATTERN: &str = r"\[([^\]]+)\]\(([^)]+)\)";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Code,
    Link,
}

/// A bounded unit of content. Identity is `(file, start_line)`; lines are 1-based.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub file: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub kind: BlockKind,
}

impl ContentBlock {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A `[text](target)` reference found outside code.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    pub line: usize,
    pub text: String,
    pub target: String,
    /// The full matched `[text](target)` string
    pub full_match: String,
}

/// What link scanning found in one file.
#[derive(Debug, Default)]
pub struct LinkScan {
    pub links: Vec<LinkRef>,
    /// Non-fatal problems (overlong lines, link cap reached)
    pub warnings: Vec<String>,
}

/// Read a whole file, refusing anything above `max_size` bytes without reading it.
pub fn read_bounded(path: &Path, max_size: u64) -> Result<String, ExtractError> {
    let metadata = fs::metadata(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if metadata.len() > max_size {
        return Err(ExtractError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit: max_size,
        });
    }

    let bytes = fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn is_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Headings, fences, tables, lists and quotes end a paragraph and never start one.
fn is_structural(trimmed: &str) -> bool {
    trimmed.starts_with('#')
        || is_fence(trimmed)
        || trimmed.starts_with('|')
        || trimmed.starts_with('>')
        || trimmed == "---"
        || is_bullet_item(trimmed)
        || is_ordered_list_item(trimmed)
}

fn is_bullet_item(trimmed: &str) -> bool {
    ["- ", "* ", "+ "].iter().any(|marker| trimmed.starts_with(marker))
}

fn is_ordered_list_item(trimmed: &str) -> bool {
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && matches!(trimmed[digits..].chars().next(), Some('.') | Some(')'))
}

/// Extract paragraph, code and link blocks from one file's text.
///
/// Paragraph text is the run's lines trimmed and joined with `\n`. Code text is the
/// fenced content without its markers, while the line span covers both markers.
/// Blocks shorter than `min_block_size` characters are dropped.
pub fn extract_blocks(
    file: &Path,
    content: &str,
    link_re: &Regex,
    min_block_size: usize,
) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();

    let mut paragraph: Vec<&str> = Vec::new();
    let mut paragraph_start = 0;

    let mut in_code = false;
    let mut fence = "";
    let mut code_lines: Vec<&str> = Vec::new();
    let mut code_start = 0;

    let flush_paragraph = |lines: &mut Vec<&str>, start: usize, end: usize, out: &mut Vec<ContentBlock>| {
        if !lines.is_empty() {
            out.push(ContentBlock {
                file: file.to_path_buf(),
                start_line: start,
                end_line: end,
                text: lines.join("\n"),
                kind: BlockKind::Paragraph,
            });
            lines.clear();
        }
    };

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        let trimmed = line.trim();

        if in_code {
            if trimmed.starts_with(fence) {
                in_code = false;
                blocks.push(ContentBlock {
                    file: file.to_path_buf(),
                    start_line: code_start,
                    end_line: line_no,
                    text: code_lines.join("\n"),
                    kind: BlockKind::Code,
                });
                code_lines.clear();
            } else {
                code_lines.push(line.trim_end());
            }
            continue;
        }

        if is_fence(trimmed) {
            flush_paragraph(&mut paragraph, paragraph_start, line_no - 1, &mut blocks);
            in_code = true;
            fence = &trimmed[..3];
            code_start = line_no;
            continue;
        }

        if line.len() <= MAX_LINE_LENGTH {
            for caps in link_re.captures_iter(line) {
                blocks.push(ContentBlock {
                    file: file.to_path_buf(),
                    start_line: line_no,
                    end_line: line_no,
                    text: caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default(),
                    kind: BlockKind::Link,
                });
            }
        }

        if trimmed.is_empty() || is_structural(trimmed) {
            flush_paragraph(&mut paragraph, paragraph_start, line_no - 1, &mut blocks);
            continue;
        }

        if paragraph.is_empty() {
            paragraph_start = line_no;
        }
        paragraph.push(trimmed);
    }

    // An unterminated fence swallows the rest of the file; nothing to emit for it
    let last_line = content.lines().count();
    flush_paragraph(&mut paragraph, paragraph_start, last_line, &mut blocks);

    blocks.retain(|b| b.char_len() >= min_block_size);
    blocks.sort_by_key(|b| b.start_line);
    blocks
}

/// Find `[text](target)` links outside fenced code, at most `max_links` of them.
pub fn extract_links(file: &Path, content: &str, link_re: &Regex, max_links: usize) -> LinkScan {
    let mut scan = LinkScan::default();
    let mut in_code = false;
    let mut fence = "";

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        let trimmed = line.trim();

        if in_code {
            if trimmed.starts_with(fence) {
                in_code = false;
            }
            continue;
        }
        if is_fence(trimmed) {
            in_code = true;
            fence = &trimmed[..3];
            continue;
        }

        if line.len() > MAX_LINE_LENGTH {
            scan.warnings.push(format!(
                "Line {} in {} exceeds max length ({} > {})",
                line_no,
                file.display(),
                line.len(),
                MAX_LINE_LENGTH
            ));
            continue;
        }

        for caps in link_re.captures_iter(line) {
            if scan.links.len() >= max_links {
                scan.warnings.push(format!(
                    "Link limit reached in {} (max {})",
                    file.display(),
                    max_links
                ));
                return scan;
            }
            scan.links.push(LinkRef {
                line: line_no,
                text: caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
                target: caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
                full_match: caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default(),
            });
        }
    }

    scan
}
