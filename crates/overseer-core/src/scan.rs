//! Content quality scan over a target's documents.
//!
//! Three checks per file: relative markdown links that point at nothing,
//! marker words such as `TODO`, and headings whose section holds only blank
//! lines. Lines inside fenced code blocks are ignored by all three.

use crate::config::ScanConfig;
use crate::error::{OverseerError, Result};
use crate::target::MutationTarget;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    BrokenLink,
    Marker,
    EmptySection,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::BrokenLink => "broken_link",
            IssueKind::Marker => "marker",
            IssueKind::EmptySection => "empty_section",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanIssue {
    pub kind: IssueKind,
    /// 1-based.
    pub line: usize,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// Relative to the target root.
    pub path: PathBuf,
    pub issues: Vec<ScanIssue>,
}

pub struct Scanner {
    extensions: Vec<String>,
    link_re: Regex,
    heading_re: Regex,
    marker_re: Option<Regex>,
}

impl Scanner {
    pub fn new(cfg: &ScanConfig) -> Result<Self> {
        let link_re = Regex::new(r"\[([^\]]+)\]\(([^)]+)\)")
            .map_err(|e| OverseerError::InvalidConfig(e.to_string()))?;
        let heading_re = Regex::new(r"^\s{0,3}#{1,6}(\s|$)")
            .map_err(|e| OverseerError::InvalidConfig(e.to_string()))?;
        let marker_re = if cfg.markers.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = cfg.markers.iter().map(|m| regex::escape(m)).collect();
            let re = Regex::new(&format!(r"\b(?:{})\b", alternatives.join("|")))
                .map_err(|e| OverseerError::InvalidConfig(format!("scan.markers: {e}")))?;
            Some(re)
        };
        Ok(Self {
            extensions: cfg
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            link_re,
            heading_re,
            marker_re,
        })
    }

    /// Scan every matching file under the target, skipping `.git`.
    /// Only files with at least one issue are returned, sorted by path.
    pub fn scan_tree(&self, target: &MutationTarget) -> Result<Vec<FileReport>> {
        let root = target.root();
        let mut reports = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");

        for entry in walker {
            let entry = entry.map_err(|e| OverseerError::Io(e.into()))?;
            if !entry.file_type().is_file() || !self.wants(entry.path()) {
                continue;
            }
            let content = match std::fs::read_to_string(entry.path()) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let issues = self.scan_content(root, rel, &content);
            if !issues.is_empty() {
                reports.push(FileReport {
                    path: rel.to_path_buf(),
                    issues,
                });
            }
        }
        reports.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(reports)
    }

    fn wants(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }

    /// Scan one file's text. `rel` locates the file inside `root` so that
    /// relative links can be resolved.
    pub fn scan_content(&self, root: &Path, rel: &Path, content: &str) -> Vec<ScanIssue> {
        let base = root.join(rel.parent().unwrap_or(Path::new("")));
        let mut issues = Vec::new();
        let mut in_fence = false;
        // (heading line number, heading text, saw a blank line since)
        let mut open_heading: Option<(usize, &str, bool)> = None;

        for (idx, line) in content.lines().enumerate() {
            let number = idx + 1;
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                open_heading = None;
                continue;
            }
            if in_fence {
                continue;
            }

            if self.heading_re.is_match(line) {
                if let Some((heading_line, heading, true)) = open_heading {
                    issues.push(ScanIssue {
                        kind: IssueKind::EmptySection,
                        line: heading_line,
                        detail: heading.trim().to_string(),
                    });
                }
                open_heading = Some((number, line, false));
            } else if line.trim().is_empty() {
                if let Some((_, _, saw_blank)) = open_heading.as_mut() {
                    *saw_blank = true;
                }
            } else {
                open_heading = None;
            }

            for caps in self.link_re.captures_iter(line) {
                let link = caps[2].trim();
                if let Some(resolved) = resolve_local_link(root, &base, link) {
                    if std::fs::symlink_metadata(&resolved).is_err() {
                        issues.push(ScanIssue {
                            kind: IssueKind::BrokenLink,
                            line: number,
                            detail: link.to_string(),
                        });
                    }
                }
            }

            if let Some(re) = &self.marker_re {
                for m in re.find_iter(line) {
                    issues.push(ScanIssue {
                        kind: IssueKind::Marker,
                        line: number,
                        detail: format!("{}: {}", m.as_str(), line.trim()),
                    });
                }
            }
        }
        issues.sort_by_key(|i| i.line);
        issues
    }
}

/// Filesystem path a link refers to, or `None` for links that are not
/// checked (external URLs, mail links, pure anchors).
fn resolve_local_link(root: &Path, base: &Path, link: &str) -> Option<PathBuf> {
    // Optional title: [text](path "title")
    let link = link.split_whitespace().next().unwrap_or("");
    if link.is_empty() || link.starts_with('#') || link.contains("://") || link.starts_with("mailto:") {
        return None;
    }
    let path = link.split(['#', '?']).next().unwrap_or("");
    if path.is_empty() {
        return None;
    }
    Some(match path.strip_prefix('/') {
        Some(from_root) => root.join(from_root),
        None => base.join(path),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
