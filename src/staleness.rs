//! Stale documentation: "last updated" stamps that trail git history, and
//! deprecated commands in code samples.

use std::ops::Range;
use std::path::Path;

use chrono::NaiveDate;
use regex::Regex;

use crate::config::StalenessConfig;
use crate::confidence::ChangeCategory;
use crate::edit::ProposedEdit;

/// A "last updated" stamp found in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Timestamp {
    /// 1-based
    pub line: usize,
    pub date: NaiveDate,
    /// Byte range of the date within the line
    pub span: Range<usize>,
}

/// A deprecated command on one line.
#[derive(Debug, Clone, PartialEq)]
pub struct DeprecatedHit {
    /// 1-based
    pub line: usize,
    /// Byte range of the match within the line
    pub span: Range<usize>,
    /// Index into the detector's patterns
    pub pattern: usize,
}

struct CompiledDeprecated {
    regex: Regex,
    message: String,
    confidence: f64,
    replacement: Option<String>,
}

/// Compiled patterns for one run.
pub struct StalenessDetector {
    timestamps: Vec<Regex>,
    deprecated: Vec<CompiledDeprecated>,
    threshold_days: i64,
}

fn is_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

impl StalenessDetector {
    /// Compile every configured pattern; the first invalid one is returned as the error.
    pub fn new(config: &StalenessConfig) -> Result<Self, String> {
        let timestamps = config
            .timestamp_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| format!("Invalid timestamp pattern '{p}': {e}")))
            .collect::<Result<Vec<_>, _>>()?;

        let deprecated = config
            .deprecated_patterns
            .iter()
            .map(|d| {
                let regex = Regex::new(&d.pattern)
                    .map_err(|e| format!("Invalid deprecated pattern '{}': {e}", d.pattern))?;
                let message = if d.message.is_empty() {
                    format!("Deprecated pattern found: {}", d.pattern)
                } else {
                    d.message.clone()
                };
                Ok(CompiledDeprecated {
                    regex,
                    message,
                    confidence: d.confidence,
                    replacement: d.replacement.clone(),
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(Self {
            timestamps,
            deprecated,
            threshold_days: i64::from(config.threshold_days),
        })
    }

    /// First stamp in `content` whose captured text starts with a valid date.
    pub fn find_timestamp(&self, content: &str) -> Option<Timestamp> {
        for (i, line) in content.lines().enumerate() {
            for re in &self.timestamps {
                let Some(group) = re.captures(line).and_then(|c| c.get(1)) else {
                    continue;
                };
                let token = group.as_str().split_whitespace().next().unwrap_or_default();
                let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") else {
                    continue;
                };
                let start = group.start() + (group.as_str().len() - group.as_str().trim_start().len());
                return Some(Timestamp {
                    line: i + 1,
                    date,
                    span: start..start + token.len(),
                });
            }
        }
        None
    }

    /// Deprecated commands inside fenced code or on lines with inline code.
    pub fn find_deprecated(&self, content: &str) -> Vec<DeprecatedHit> {
        let mut hits = Vec::new();
        let mut in_code = false;

        for (i, line) in content.lines().enumerate() {
            if is_fence(line.trim()) {
                in_code = !in_code;
                continue;
            }
            if !in_code && !line.contains('`') {
                continue;
            }
            for (pattern, compiled) in self.deprecated.iter().enumerate() {
                for m in compiled.regex.find_iter(line) {
                    if m.is_empty() {
                        continue;
                    }
                    hits.push(DeprecatedHit {
                        line: i + 1,
                        span: m.range(),
                        pattern,
                    });
                }
            }
        }
        hits
    }

    /// Edit moving a stamp to `last_commit` when it trails by more than the threshold.
    pub fn timestamp_edit(
        &self,
        file: &Path,
        content: &str,
        stamp: &Timestamp,
        last_commit: NaiveDate,
    ) -> Option<ProposedEdit> {
        let behind = (last_commit - stamp.date).num_days();
        if behind <= self.threshold_days {
            return None;
        }
        let line = content.lines().nth(stamp.line - 1)?;
        let new_date = last_commit.format("%Y-%m-%d").to_string();

        let mut new_text = line.to_string();
        new_text.replace_range(stamp.span.clone(), &new_date);

        Some(ProposedEdit {
            file: file.to_path_buf(),
            anchor_line: stamp.line,
            old_text: line.to_string(),
            new_text,
            confidence: 1.0,
            reason: format!(
                "Timestamp {behind} days behind git history ({} -> {new_date})",
                stamp.date.format("%Y-%m-%d")
            ),
            category: ChangeCategory::SyncCanonical,
            requires_review: false,
        })
    }

    /// One whole-line edit per line with hits, its reason listing one message per
    /// hit joined with `"; "`.
    ///
    /// Overlapping matches keep the first. A line with a pattern lacking a
    /// replacement is review-only; its confidence is the lowest among its hits.
    pub fn deprecated_edits(&self, file: &Path, content: &str, hits: &[DeprecatedHit]) -> Vec<ProposedEdit> {
        let lines: Vec<&str> = content.lines().collect();
        let mut edits = Vec::new();

        let mut rest = hits;
        while let Some(first) = rest.first() {
            let same_line = rest.iter().take_while(|h| h.line == first.line).count();
            let (on_line, tail) = rest.split_at(same_line);
            rest = tail;

            let Some(line) = lines.get(first.line - 1) else {
                continue;
            };

            let mut ordered: Vec<&DeprecatedHit> = on_line.iter().collect();
            ordered.sort_by_key(|h| h.span.start);

            let mut new_text = String::with_capacity(line.len());
            let mut cursor = 0;
            let mut confidence = 1.0f64;
            let mut requires_review = false;
            let mut reasons: Vec<&str> = Vec::new();

            for hit in ordered {
                if hit.span.start < cursor {
                    continue;
                }
                let pattern = &self.deprecated[hit.pattern];
                new_text.push_str(&line[cursor..hit.span.start]);
                match &pattern.replacement {
                    Some(replacement) => new_text.push_str(replacement),
                    None => {
                        new_text.push_str(&line[hit.span.clone()]);
                        requires_review = true;
                    }
                }
                cursor = hit.span.end;
                confidence = confidence.min(pattern.confidence);
                reasons.push(&pattern.message);
            }
            new_text.push_str(&line[cursor..]);

            edits.push(ProposedEdit {
                file: file.to_path_buf(),
                anchor_line: first.line,
                old_text: line.to_string(),
                new_text,
                confidence,
                reason: reasons.join("; "),
                category: ChangeCategory::CodeChange,
                requires_review,
            });
        }
        edits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeprecatedPattern;

    fn detector() -> StalenessDetector {
        StalenessDetector::new(&StalenessConfig::default()).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    const DOC: &str = "# Guide\n\n**Last Updated**: 2024-01-05 10:00:00\n\nRun `docker-compose up -d` first.\n\n```bash\nsudo pip install tool\ngit checkout -b feature\n```\n\ndocker-compose outside code is prose.\n";

    #[test]
    fn test_find_timestamp() {
        let stamp = detector().find_timestamp(DOC).unwrap();
        assert_eq!(stamp.line, 3);
        assert_eq!(stamp.date, date("2024-01-05"));
        let line = DOC.lines().nth(2).unwrap();
        assert_eq!(&line[stamp.span.clone()], "2024-01-05");
    }

    #[test]
    fn test_invalid_date_is_skipped() {
        let content = "Last updated: 2024-13-40\n_Last modified: 2023-06-01_\n";
        let stamp = detector().find_timestamp(content).unwrap();
        assert_eq!(stamp.line, 2);
        assert_eq!(stamp.date, date("2023-06-01"));
        assert!(detector().find_timestamp("no stamp here\n").is_none());
    }

    #[test]
    fn test_timestamp_edit_respects_threshold() {
        let d = detector();
        let file = Path::new("docs/guide.md");
        let stamp = d.find_timestamp(DOC).unwrap();

        assert!(d.timestamp_edit(file, DOC, &stamp, date("2024-02-04")).is_none());

        let edit = d.timestamp_edit(file, DOC, &stamp, date("2024-03-01")).unwrap();
        assert_eq!(edit.anchor_line, 3);
        assert_eq!(edit.old_text, "**Last Updated**: 2024-01-05 10:00:00");
        assert_eq!(edit.new_text, "**Last Updated**: 2024-03-01 10:00:00");
        assert_eq!(edit.confidence, 1.0);
        assert!(edit.reason.contains("56 days behind"));
        assert_eq!(edit.category, ChangeCategory::SyncCanonical);
    }

    #[test]
    fn test_deprecated_only_in_code() {
        let d = detector();
        let hits = d.find_deprecated(DOC);
        let lines: Vec<usize> = hits.iter().map(|h| h.line).collect();
        assert_eq!(lines, vec![5, 8, 9]);

        let edits = d.deprecated_edits(Path::new("g.md"), DOC, &hits);
        assert_eq!(edits.len(), 3);
        assert_eq!(edits[0].new_text, "Run `docker compose up -d` first.");
        assert_eq!(edits[0].confidence, 0.95);
        assert_eq!(edits[1].new_text, "pip install tool");
        assert_eq!(edits[2].new_text, "git switch -c feature");
        assert_eq!(edits[2].confidence, 0.80);
        assert!(edits.iter().all(|e| e.category == ChangeCategory::CodeChange && !e.requires_review));
    }

    #[test]
    fn test_two_hits_on_one_line_merge() {
        let d = detector();
        let content = "`python2 a.py && virtualenv env`\n";
        let hits = d.find_deprecated(content);
        assert_eq!(hits.len(), 2);

        let edits = d.deprecated_edits(Path::new("g.md"), content, &hits);
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].new_text, "`python3 a.py && python3 -m venv env`");
        assert_eq!(edits[0].confidence, 0.85);
        assert_eq!(edits[0].reason.matches("; ").count(), 1);
    }

    #[test]
    fn test_pattern_without_replacement_needs_review() {
        let config = StalenessConfig {
            deprecated_patterns: vec![DeprecatedPattern {
                pattern: r"npm i -g ".to_string(),
                message: String::new(),
                confidence: 0.85,
                replacement: None,
            }],
            ..StalenessConfig::default()
        };
        let d = StalenessDetector::new(&config).unwrap();
        let content = "```\nnpm i -g tool\n```\n";
        let hits = d.find_deprecated(content);
        let edits = d.deprecated_edits(Path::new("g.md"), content, &hits);

        assert_eq!(edits.len(), 1);
        assert!(edits[0].requires_review);
        assert_eq!(edits[0].new_text, edits[0].old_text);
        assert_eq!(edits[0].reason, "Deprecated pattern found: npm i -g ");
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let config = StalenessConfig {
            timestamp_patterns: vec!["(".to_string()],
            ..StalenessConfig::default()
        };
        assert!(StalenessDetector::new(&config).is_err());
    }
}
