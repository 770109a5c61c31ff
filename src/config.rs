//! Server paths and the analysis-process invocation, fixed at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

/// How to start one analysis-process instance.
#[derive(Debug, Clone)]
pub struct AnalysisCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl AnalysisCommand {
    /// The production invocation: `lake serve` in the Lean project directory.
    pub fn lake_serve(project_dir: &Path) -> Self {
        Self {
            program: "lake".to_string(),
            args: vec!["serve".to_string()],
            cwd: project_dir.to_path_buf(),
        }
    }
}

/// URIs handed to editor clients, as served by `GET /file-uri`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileUriInfo {
    pub file_uri: String,
    pub root_uri: String,
}

/// Filesystem layout the server operates on. Computed once at startup and
/// constant thereafter.
#[derive(Debug, Clone)]
pub struct ServerPaths {
    /// Lean project directory; the analysis process runs here.
    pub project_dir: PathBuf,
    /// The shared mirror file the analysis process reads from disk.
    pub scratch_file: PathBuf,
    /// Directory holding per-room update logs.
    pub data_dir: PathBuf,
    uris: FileUriInfo,
}

impl ServerPaths {
    pub fn new(project_dir: &Path, data_dir: &Path) -> Self {
        let project_dir = absolute(project_dir);
        let scratch_file = project_dir.join("src").join("Scratch.lean");
        let uris = FileUriInfo {
            file_uri: file_uri_for(&scratch_file),
            root_uri: file_uri_for(&project_dir),
        };
        Self {
            project_dir,
            scratch_file,
            data_dir: absolute(data_dir),
            uris,
        }
    }

    pub fn file_uri_info(&self) -> FileUriInfo {
        self.uris.clone()
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Render an absolute `file://` URI for a path.
pub fn file_uri_for(path: &Path) -> String {
    let abs = absolute(path);
    Url::from_file_path(&abs)
        .map(String::from)
        .unwrap_or_else(|_| format!("file://{}", abs.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uris_are_absolute_file_uris() {
        let paths = ServerPaths::new(Path::new("/opt/lean-project"), Path::new("/var/lib/leanshare"));
        let info = paths.file_uri_info();
        assert_eq!(info.root_uri, "file:///opt/lean-project");
        assert_eq!(info.file_uri, "file:///opt/lean-project/src/Scratch.lean");
        assert!(crate::protocol::is_file_uri(&info.file_uri));
    }

    #[test]
    fn relative_paths_are_resolved() {
        let paths = ServerPaths::new(Path::new("lean-project"), Path::new("data"));
        assert!(paths.project_dir.is_absolute());
        assert!(paths.data_dir.is_absolute());
        assert!(paths.file_uri_info().root_uri.starts_with("file:///"));
    }

    #[test]
    fn file_uri_info_serializes_camel_case() {
        let info = FileUriInfo {
            file_uri: "file:///a".to_string(),
            root_uri: "file:///b".to_string(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["fileUri"], "file:///a");
        assert_eq!(json["rootUri"], "file:///b");
    }

    #[test]
    fn lake_serve_invocation() {
        let cmd = AnalysisCommand::lake_serve(Path::new("/opt/lean-project"));
        assert_eq!(cmd.program, "lake");
        assert_eq!(cmd.args, vec!["serve"]);
        assert_eq!(cmd.cwd, PathBuf::from("/opt/lean-project"));
    }
}
