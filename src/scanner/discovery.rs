//! Project, session and subagent discovery.
//!
//! Layout under the projects root:
//!
//! ```text
//! <root>/<project-id>/<session-id>.jsonl
//! <root>/<project-id>/<session-id>/subagents/agent-<id>.jsonl
//! ```
//!
//! Only directory listings and metadata are read here.

use std::fs::{self, ReadDir};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::error::ScanError;

/// Extension of session log files.
pub const LOG_EXTENSION: &str = "jsonl";

/// File name prefix of subagent logs.
const AGENT_PREFIX: &str = "agent-";

/// Name of the per-session subagent directory.
pub const SUBAGENTS_DIR: &str = "subagents";

/// A session log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// File stem, or the `<id>` of `agent-<id>.jsonl` for subagents.
    pub id: String,
    pub path: PathBuf,
    /// `<project>/<id>/subagents` when it exists. Always `None` for subagents.
    pub subagents_dir: Option<PathBuf>,
    pub modified: SystemTime,
}

/// A project directory and its sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    /// Directory name. Opaque.
    pub id: String,
    pub path: PathBuf,
    /// Newest first.
    pub sessions: Vec<SessionInfo>,
    /// Latest of the directory mtime and all session mtimes.
    pub last_activity: SystemTime,
}

/// Default projects root: `~/.claude/projects`.
///
/// Returns `None` if the home directory cannot be determined.
#[must_use]
pub fn default_projects_root() -> Option<PathBuf> {
    Some(dirs::home_dir()?.join(".claude").join("projects"))
}

/// Subagent id from an `agent-<id>.jsonl` file name.
///
/// ```
/// use agent_timeline::scanner::extract_agent_id;
///
/// assert_eq!(extract_agent_id("agent-a1b2.jsonl").as_deref(), Some("a1b2"));
/// assert_eq!(extract_agent_id("0f3c9e.jsonl"), None);
/// ```
#[must_use]
pub fn extract_agent_id(filename: &str) -> Option<String> {
    file_stem(filename)?
        .strip_prefix(AGENT_PREFIX)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// List every project under `root`, most recently active first.
///
/// A missing root yields an empty list.
///
/// # Errors
///
/// Returns an error if a directory exists but cannot be listed.
pub fn scan_projects(root: &Path) -> Result<Vec<ProjectInfo>, ScanError> {
    let Some(entries) = read_dir_if_exists(root)? else {
        tracing::debug!(root = %root.display(), "Projects root not found");
        return Ok(Vec::new());
    };

    let mut projects = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ScanError::io(root, e))?.path();
        let Some(metadata) = metadata_if_exists(&path)? else {
            continue;
        };
        if !metadata.is_dir() {
            continue;
        }
        let Some(id) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        let sessions = scan_sessions(&path)?;
        let last_activity = sessions
            .iter()
            .map(|s| s.modified)
            .fold(modified_time(&metadata), std::cmp::max);

        projects.push(ProjectInfo {
            id,
            path,
            sessions,
            last_activity,
        });
    }

    projects.sort_by(|a, b| {
        b.last_activity
            .cmp(&a.last_activity)
            .then_with(|| a.id.cmp(&b.id))
    });
    tracing::debug!(root = %root.display(), count = projects.len(), "Scanned projects");
    Ok(projects)
}

/// List the session logs of a project, newest first.
///
/// A missing directory yields an empty list.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be listed.
pub fn scan_sessions(project_dir: &Path) -> Result<Vec<SessionInfo>, ScanError> {
    let mut sessions = list_logs(project_dir, file_stem)?;
    for session in &mut sessions {
        let candidate = project_dir.join(&session.id).join(SUBAGENTS_DIR);
        if candidate.is_dir() {
            session.subagents_dir = Some(candidate);
        }
    }
    sessions.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(sessions)
}

/// List the subagent logs in a `subagents` directory, oldest first.
///
/// A missing directory yields an empty list.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be listed.
pub fn scan_subagents(subagents_dir: &Path) -> Result<Vec<SessionInfo>, ScanError> {
    let mut agents = list_logs(subagents_dir, |name| {
        extract_agent_id(name).or_else(|| file_stem(name))
    })?;
    agents.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.id.cmp(&b.id)));
    Ok(agents)
}

fn file_stem(filename: &str) -> Option<String> {
    let stem = filename.strip_suffix(&format!(".{LOG_EXTENSION}"))?;
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Unsorted log files in `dir`, identified by `id_of(file_name)`.
fn list_logs(
    dir: &Path,
    id_of: impl Fn(&str) -> Option<String>,
) -> Result<Vec<SessionInfo>, ScanError> {
    let Some(entries) = read_dir_if_exists(dir)? else {
        return Ok(Vec::new());
    };

    let mut logs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ScanError::io(dir, e))?.path();
        if path.extension().map_or(true, |ext| ext != LOG_EXTENSION) {
            continue;
        }
        let Some(id) = path.file_name().and_then(|n| n.to_str()).and_then(&id_of) else {
            continue;
        };
        let Some(metadata) = metadata_if_exists(&path)? else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        logs.push(SessionInfo {
            id,
            path,
            subagents_dir: None,
            modified: modified_time(&metadata),
        });
    }
    Ok(logs)
}

fn read_dir_if_exists(dir: &Path) -> Result<Option<ReadDir>, ScanError> {
    match fs::read_dir(dir) {
        Ok(entries) => Ok(Some(entries)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ScanError::io(dir, e)),
    }
}

/// Follows symlinks; a path that vanished mid-scan is `None`.
fn metadata_if_exists(path: &Path) -> Result<Option<fs::Metadata>, ScanError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ScanError::io(path, e)),
    }
}

fn modified_time(metadata: &fs::Metadata) -> SystemTime {
    metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_log(path: &Path, mtime: SystemTime) {
        fs::write(path, "{}\n").unwrap();
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    #[test]
    fn test_extract_agent_id() {
        let cases = [
            ("agent-abc1234.jsonl", Some("abc1234")),
            ("agent-xyz-789.jsonl", Some("xyz-789")),
            ("agent-.jsonl", None),
            ("agent-abc.txt", None),
            ("abc.jsonl", None),
            ("", None),
        ];
        for (name, expected) in cases {
            assert_eq!(extract_agent_id(name).as_deref(), expected, "name {name:?}");
        }
    }

    #[test]
    fn test_scan_sessions_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        write_log(&temp_dir.path().join("s1.jsonl"), at(1));
        write_log(&temp_dir.path().join("s3.jsonl"), at(3));
        write_log(&temp_dir.path().join("s2.jsonl"), at(2));

        let sessions = scan_sessions(temp_dir.path()).unwrap();
        let ids: Vec<_> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s3", "s2", "s1"]);
    }

    #[test]
    fn test_scan_sessions_ignores_other_files() {
        let temp_dir = TempDir::new().unwrap();
        write_log(&temp_dir.path().join("s1.jsonl"), at(1));
        fs::write(temp_dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir(temp_dir.path().join("dir.jsonl")).unwrap();

        let sessions = scan_sessions(temp_dir.path()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "s1");
    }

    #[test]
    fn test_scan_sessions_resolves_subagents_dir() {
        let temp_dir = TempDir::new().unwrap();
        write_log(&temp_dir.path().join("with.jsonl"), at(2));
        write_log(&temp_dir.path().join("without.jsonl"), at(1));
        let subagents = temp_dir.path().join("with").join(SUBAGENTS_DIR);
        fs::create_dir_all(&subagents).unwrap();

        let sessions = scan_sessions(temp_dir.path()).unwrap();
        assert_eq!(sessions[0].id, "with");
        assert_eq!(sessions[0].subagents_dir, Some(subagents));
        assert_eq!(sessions[1].subagents_dir, None);
    }

    #[test]
    fn test_scan_subagents_oldest_first() {
        let temp_dir = TempDir::new().unwrap();
        write_log(&temp_dir.path().join("agent-c.jsonl"), at(3));
        write_log(&temp_dir.path().join("agent-a.jsonl"), at(1));
        write_log(&temp_dir.path().join("other.jsonl"), at(2));

        let agents = scan_subagents(temp_dir.path()).unwrap();
        let ids: Vec<_> = agents.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "other", "c"]);
        assert!(agents.iter().all(|a| a.subagents_dir.is_none()));
    }

    #[test]
    fn test_missing_directories_are_empty() {
        let missing = Path::new("/nonexistent/agent-timeline-12345");
        assert!(scan_projects(missing).unwrap().is_empty());
        assert!(scan_sessions(missing).unwrap().is_empty());
        assert!(scan_subagents(missing).unwrap().is_empty());
    }

    #[test]
    fn test_scan_projects_last_activity() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("-home-user-app");
        fs::create_dir(&project).unwrap();
        let future = SystemTime::UNIX_EPOCH + Duration::from_secs(4_000_000_000);
        write_log(&project.join("s1.jsonl"), future);

        let projects = scan_projects(temp_dir.path()).unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, "-home-user-app");
        assert_eq!(projects[0].last_activity, future);
        assert_eq!(projects[0].sessions.len(), 1);
    }

    #[test]
    fn test_scan_projects_skips_files_at_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("p1")).unwrap();
        write_log(&temp_dir.path().join("stray.jsonl"), at(1));

        let projects = scan_projects(temp_dir.path()).unwrap();
        assert_eq!(projects.len(), 1);
        assert!(projects[0].sessions.is_empty());
    }

    #[test]
    fn test_default_projects_root_suffix() {
        if let Some(root) = default_projects_root() {
            assert!(root.ends_with(".claude/projects"));
        }
    }
}
