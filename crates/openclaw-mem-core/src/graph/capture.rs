//! Source capture: git commits and Markdown sections.
//!
//! Both captures are idempotent index builders. A commit is recorded once
//! per (repo, sha); a Markdown section once per content fingerprint. Raw
//! bodies and diffs are never stored - the identifier and fingerprint are
//! the contract.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use walkdir::WalkDir;

use crate::observation::ObservationInput;
use crate::storage::{Result, Store, StoreError};

pub const GIT_CAPTURE_TOOL: &str = "graph.capture-git";
pub const MD_CAPTURE_TOOL: &str = "graph.capture-md";

/// Commit lookback when a repo has no recorded state.
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Per-repo commit cap per run.
pub const DEFAULT_MAX_COMMITS: usize = 200;

/// Headings at or below this level open a new section.
pub const DEFAULT_MIN_HEADING_LEVEL: usize = 2;

/// Files listed per captured commit.
const MAX_FILES_PER_COMMIT: usize = 50;

/// Content lines hashed into a section fingerprint.
const FINGERPRINT_LINES: usize = 5;

const DEFAULT_EXCLUDES: [&str; 4] = [
    "**/node_modules/**",
    "**/.venv/**",
    "**/.git/**",
    "**/dist/**",
];

// ============================================================================
// GIT CAPTURE
// ============================================================================

#[derive(Debug, Clone)]
pub struct GitCaptureOptions {
    pub repos: Vec<PathBuf>,
    pub lookback_hours: i64,
    pub max_commits: usize,
    pub state_path: PathBuf,
}

/// Per-repo watermark state, JSON on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitCaptureState {
    #[serde(default)]
    pub repos: BTreeMap<String, GitRepoState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitRepoState {
    pub last_author_ts: i64,
    pub last_sha: String,
}

impl GitCaptureState {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        crate::storage::write_atomic(path, &json).map_err(StoreError::Io)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GitCaptureReceipt {
    pub repos: usize,
    pub inserted: usize,
    pub skipped_seen: usize,
}

/// Capture recent commits from each configured repository.
pub fn capture_git(store: &Store, opts: &GitCaptureOptions) -> Result<GitCaptureReceipt> {
    let mut state = GitCaptureState::load(&opts.state_path);
    let mut inserted = 0;
    let mut skipped_seen = 0;

    for repo_path in &opts.repos {
        let repo_key = repo_path.to_string_lossy().into_owned();
        let repo_name = repo_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| repo_key.clone());

        let repo = match git2::Repository::open(repo_path) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(repo = %repo_key, error = %err, "cannot open repository; skipping");
                continue;
            }
        };

        let lookback =
            (Utc::now() - Duration::hours(opts.lookback_hours.max(1))).timestamp();
        let since = state
            .repos
            .get(&repo_key)
            .map(|s| s.last_author_ts)
            .unwrap_or(0)
            .max(lookback);

        let commits = match recent_commits(&repo, since, opts.max_commits) {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(repo = %repo_key, error = %err, "commit walk failed; skipping");
                continue;
            }
        };

        let mut newest_ts = since;
        let mut newest_sha = String::new();

        // Oldest first so ledger ids follow commit time.
        for commit in commits.into_iter().rev() {
            if newest_ts < commit.author_ts {
                newest_ts = commit.author_ts;
                newest_sha = commit.sha.clone();
            }

            if store.git_commit_seen(&repo_name, &commit.sha)?
                || store.legacy_git_capture_exists(&repo_name, &commit.sha)?
            {
                skipped_seen += 1;
                continue;
            }

            let author_iso = DateTime::<Utc>::from_timestamp(commit.author_ts, 0)
                .unwrap_or_else(Utc::now)
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string();
            let short = &commit.sha[..commit.sha.len().min(7)];

            store.insert_observation(&ObservationInput {
                ts: Some(author_iso.clone()),
                kind: Some("note".to_string()),
                summary: Some(format!("[GIT] {repo_name} {short} {}", commit.subject)),
                tool_name: Some(GIT_CAPTURE_TOOL.to_string()),
                detail: Some(serde_json::json!({
                    "repo": repo_name,
                    "sha": commit.sha,
                    "author_ts": author_iso,
                    "files": commit.files,
                })),
                ..Default::default()
            })?;
            store.mark_git_commit_seen(&repo_name, &commit.sha)?;
            inserted += 1;
        }

        if !newest_sha.is_empty() {
            state.repos.insert(
                repo_key,
                GitRepoState {
                    last_author_ts: newest_ts,
                    last_sha: newest_sha,
                },
            );
        }
    }

    state.save(&opts.state_path)?;
    Ok(GitCaptureReceipt {
        repos: opts.repos.len(),
        inserted,
        skipped_seen,
    })
}

struct CapturedCommit {
    sha: String,
    author_ts: i64,
    subject: String,
    files: Vec<String>,
}

/// Commits newer than `since`, newest first, capped.
fn recent_commits(
    repo: &git2::Repository,
    since: i64,
    max: usize,
) -> std::result::Result<Vec<CapturedCommit>, git2::Error> {
    let mut walk = repo.revwalk()?;
    walk.push_head()?;
    walk.set_sorting(git2::Sort::TIME)?;

    let mut out = Vec::new();
    for oid in walk {
        if out.len() >= max {
            break;
        }
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        let author_ts = commit.author().when().seconds();
        if author_ts <= since {
            break;
        }

        out.push(CapturedCommit {
            sha: oid.to_string(),
            author_ts,
            subject: commit.summary().unwrap_or("").to_string(),
            files: commit_files(repo, &commit)?,
        });
    }
    Ok(out)
}

fn commit_files(
    repo: &git2::Repository,
    commit: &git2::Commit<'_>,
) -> std::result::Result<Vec<String>, git2::Error> {
    let tree = commit.tree()?;
    let parent_tree = match commit.parent(0) {
        Ok(parent) => Some(parent.tree()?),
        Err(_) => None,
    };
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

    let mut files = Vec::new();
    for delta in diff.deltas() {
        if files.len() >= MAX_FILES_PER_COMMIT {
            break;
        }
        if let Some(path) = delta.new_file().path() {
            files.push(path.to_string_lossy().into_owned());
        }
    }
    Ok(files)
}

// ============================================================================
// MARKDOWN CAPTURE
// ============================================================================

#[derive(Debug, Clone)]
pub struct MdCaptureOptions {
    pub paths: Vec<PathBuf>,
    pub include_exts: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub min_heading_level: usize,
}

impl Default for MdCaptureOptions {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            include_exts: vec!["md".to_string()],
            exclude_globs: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            min_heading_level: DEFAULT_MIN_HEADING_LEVEL,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MdCaptureReceipt {
    pub files_scanned: usize,
    pub files_skipped_unchanged: usize,
    pub sections_seen: usize,
    pub inserted: usize,
}

/// Capture new Markdown sections under the configured paths.
pub fn capture_markdown(store: &Store, opts: &MdCaptureOptions) -> Result<MdCaptureReceipt> {
    let excludes = build_globset(&opts.exclude_globs);
    let mut receipt = MdCaptureReceipt {
        files_scanned: 0,
        files_skipped_unchanged: 0,
        sections_seen: 0,
        inserted: 0,
    };

    for root in &opts.paths {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(error = %err, "walk error; skipping entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if excludes.is_match(path) {
                continue;
            }
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if !opts.include_exts.iter().any(|e| e.trim_start_matches('.') == ext) {
                continue;
            }

            let mtime = file_mtime(path).unwrap_or(0.0);
            let path_str = path.to_string_lossy().into_owned();
            if let Some(last) = store.md_file_last_mtime(&path_str)? {
                if mtime <= last {
                    receipt.files_skipped_unchanged += 1;
                    continue;
                }
            }

            receipt.files_scanned += 1;
            capture_markdown_file(store, path, mtime, opts.min_heading_level, &mut receipt)?;
        }
    }

    Ok(receipt)
}

fn capture_markdown_file(
    store: &Store,
    path: &Path,
    mtime: f64,
    min_heading_level: usize,
    receipt: &mut MdCaptureReceipt,
) -> Result<()> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "unreadable file; skipping");
            return Ok(());
        }
    };
    let content = crate::text::scrub_lossy_bytes(&bytes);
    let file_hash = sha1_hex(content.as_bytes());
    let path_str = path.to_string_lossy().into_owned();
    let rel_path = repo_relative_path(path);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for section in split_sections(&content, min_heading_level) {
        receipt.sections_seen += 1;
        let fingerprint = section_fingerprint(&section);
        if store.md_fingerprint_seen(&fingerprint)? {
            continue;
        }

        store.insert_observation(&ObservationInput {
            kind: Some("note".to_string()),
            summary: Some(format!("[MD] {file_name}#{}", section.heading)),
            tool_name: Some(MD_CAPTURE_TOOL.to_string()),
            detail: Some(serde_json::json!({
                "path": path_str,
                "rel_path": rel_path,
                "heading": section.heading,
                "level": section.level,
                "start_line": section.start_line,
                "end_line": section.end_line,
                "mtime": mtime,
                "file_sha1": file_hash,
                "fingerprint": fingerprint,
            })),
            ..Default::default()
        })?;
        store.mark_md_fingerprint_seen(&fingerprint, &path_str, mtime)?;
        receipt.inserted += 1;
    }

    Ok(())
}

#[derive(Debug, Clone)]
struct MdSection {
    heading: String,
    level: usize,
    start_line: usize,
    end_line: usize,
    content_lines: Vec<String>,
}

/// Split into sections at headings of level <= `min_heading_level`.
/// Fenced code blocks are opaque: no headings inside, and their lines do
/// not contribute to fingerprints.
fn split_sections(content: &str, min_heading_level: usize) -> Vec<MdSection> {
    let mut sections: Vec<MdSection> = Vec::new();
    let mut current: Option<MdSection> = None;
    let mut in_code = false;

    for (idx, line) in content.lines().enumerate() {
        let lineno = idx + 1;
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_code = !in_code;
            if let Some(section) = current.as_mut() {
                section.end_line = lineno;
            }
            continue;
        }

        if !in_code {
            if let Some((level, heading)) = parse_heading(line) {
                if level <= min_heading_level {
                    if let Some(done) = current.take() {
                        sections.push(done);
                    }
                    current = Some(MdSection {
                        heading,
                        level,
                        start_line: lineno,
                        end_line: lineno,
                        content_lines: Vec::new(),
                    });
                    continue;
                }
            }
        }

        if let Some(section) = current.as_mut() {
            section.end_line = lineno;
            if !in_code
                && !line.trim().is_empty()
                && section.content_lines.len() < FINGERPRINT_LINES
            {
                section.content_lines.push(line.trim().to_string());
            }
        }
    }
    if let Some(done) = current.take() {
        sections.push(done);
    }
    sections
}

fn parse_heading(line: &str) -> Option<(usize, String)> {
    let hashes = line.len() - line.trim_start_matches('#').len();
    if hashes == 0 || hashes > 6 || !line.starts_with('#') {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    let heading = rest.trim().trim_end_matches('#').trim().to_string();
    if heading.is_empty() {
        return None;
    }
    Some((hashes, heading))
}

fn section_fingerprint(section: &MdSection) -> String {
    let mut material = section.heading.clone();
    for line in &section.content_lines {
        material.push('\n');
        material.push_str(line);
    }
    sha1_hex(material.as_bytes())
}

fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn file_mtime(path: &Path) -> Option<f64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let secs = modified
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_secs_f64();
    Some(secs)
}

/// Repository-relative path when the file sits inside a git working tree.
fn repo_relative_path(path: &Path) -> Option<String> {
    let repo = git2::Repository::discover(path.parent()?).ok()?;
    let workdir = repo.workdir()?;
    path.strip_prefix(workdir)
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
}

fn build_globset(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => {
                tracing::warn!(pattern = %pattern, error = %err, "invalid exclude glob; ignoring");
            }
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn git_commit(dir: &Path, file: &str, content: &str, message: &str) -> String {
        let repo = git2::Repository::init(dir).unwrap();
        std::fs::write(dir.join(file), content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(file)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("Tester", "tester@example.com").unwrap();

        let parent = repo
            .head()
            .ok()
            .and_then(|h| h.target())
            .and_then(|oid| repo.find_commit(oid).ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_git_capture_inserts_once() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let sha = git_commit(tmp.path(), "a.txt", "hello", "add a.txt");

        let opts = GitCaptureOptions {
            repos: vec![tmp.path().to_path_buf()],
            lookback_hours: DEFAULT_LOOKBACK_HOURS,
            max_commits: DEFAULT_MAX_COMMITS,
            state_path: tmp.path().join("git-state.json"),
        };

        let first = capture_git(&store, &opts).unwrap();
        assert_eq!(first.inserted, 1);

        let rows = store.get_observations(&[1]).unwrap();
        let summary = rows[0].summary.as_deref().unwrap();
        assert!(summary.starts_with("[GIT] "));
        assert!(summary.contains(&sha[..7]));
        assert!(summary.contains("add a.txt"));
        let detail = rows[0].detail();
        assert_eq!(detail["sha"], sha);
        assert_eq!(detail["files"], serde_json::json!(["a.txt"]));

        // Second run over the unchanged repo inserts nothing.
        let second = capture_git(&store, &opts).unwrap();
        assert_eq!(second.inserted, 0);
    }

    #[test]
    fn test_git_capture_state_advances() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        git_commit(tmp.path(), "a.txt", "one", "first");

        let opts = GitCaptureOptions {
            repos: vec![tmp.path().to_path_buf()],
            lookback_hours: DEFAULT_LOOKBACK_HOURS,
            max_commits: DEFAULT_MAX_COMMITS,
            state_path: tmp.path().join("git-state.json"),
        };
        capture_git(&store, &opts).unwrap();

        let state = GitCaptureState::load(&opts.state_path);
        let entry = state.repos.values().next().unwrap();
        assert!(entry.last_author_ts > 0);
        assert!(!entry.last_sha.is_empty());
    }

    #[test]
    fn test_markdown_capture_fingerprints_sections() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let doc = tmp.path().join("notes.md");
        std::fs::write(
            &doc,
            "# Title\nintro text\n\n## Decisions\nwe chose sqlite\nand wal mode\n\n```\n# not a heading\n```\n## Open\npending item\n",
        )
        .unwrap();

        let opts = MdCaptureOptions {
            paths: vec![tmp.path().to_path_buf()],
            ..Default::default()
        };

        let receipt = capture_markdown(&store, &opts).unwrap();
        assert_eq!(receipt.files_scanned, 1);
        assert_eq!(receipt.inserted, 3);

        let rows = store.get_observations(&[1, 2, 3]).unwrap();
        let summaries: Vec<&str> = rows.iter().filter_map(|o| o.summary.as_deref()).collect();
        assert!(summaries.iter().any(|s| s.contains("notes.md#Title")));
        assert!(summaries.iter().any(|s| s.contains("notes.md#Decisions")));
        assert!(summaries.iter().any(|s| s.contains("notes.md#Open")));

        // Bodies are never stored.
        for row in &rows {
            let detail = row.detail();
            assert!(detail.get("body").is_none());
            assert!(!row.detail_json.contains("we chose sqlite"));
            assert!(detail["fingerprint"].as_str().unwrap().len() == 40);
        }
    }

    #[test]
    fn test_markdown_capture_idempotent_without_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        std::fs::write(tmp.path().join("a.md"), "## One\nbody\n").unwrap();

        let opts = MdCaptureOptions {
            paths: vec![tmp.path().to_path_buf()],
            ..Default::default()
        };
        let first = capture_markdown(&store, &opts).unwrap();
        assert_eq!(first.inserted, 1);

        let second = capture_markdown(&store, &opts).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.files_skipped_unchanged, 1);
    }

    #[test]
    fn test_markdown_capture_respects_excludes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let nested = tmp.path().join("node_modules");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("skip.md"), "## Hidden\nbody\n").unwrap();
        std::fs::write(tmp.path().join("keep.md"), "## Kept\nbody\n").unwrap();

        let opts = MdCaptureOptions {
            paths: vec![tmp.path().to_path_buf()],
            ..Default::default()
        };
        let receipt = capture_markdown(&store, &opts).unwrap();
        assert_eq!(receipt.inserted, 1);

        let rows = store.get_observations(&[1]).unwrap();
        assert!(rows[0].summary.as_deref().unwrap().contains("keep.md#Kept"));
    }

    #[test]
    fn test_heading_parser() {
        assert_eq!(parse_heading("# Title"), Some((1, "Title".to_string())));
        assert_eq!(parse_heading("## Sub ##"), Some((2, "Sub".to_string())));
        assert_eq!(parse_heading("####### too deep"), None);
        assert_eq!(parse_heading("plain text"), None);
        assert_eq!(parse_heading("#"), None);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let section = MdSection {
            heading: "H".to_string(),
            level: 2,
            start_line: 1,
            end_line: 3,
            content_lines: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(section_fingerprint(&section), section_fingerprint(&section));
        assert_eq!(section_fingerprint(&section).len(), 40);
    }
}
