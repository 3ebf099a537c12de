//! Interpreter and bundled script discovery.
//!
//! Both searches are deterministic: candidates are probed in a fixed order
//! and the first existing file wins.

use std::path::{Path, PathBuf};

/// Interpreter binary name looked up inside virtual environments and on `PATH`.
pub const INTERPRETER_NAME: &str = "python3";

/// Maximum directory depth of the recursive script search.
const SCRIPT_SEARCH_DEPTH: usize = 4;

/// Where an interpreter was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterSource {
    /// Explicit `runner.interpreter` setting.
    Override,
    /// Environment bundled next to the bridge install.
    InstallDir,
    /// Environment next to the resolved script.
    ScriptDir,
    /// Shared per-user environment.
    UserEnv,
    /// `python3` on `PATH`.
    SystemPath,
}

/// A resolved interpreter binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInterpreter {
    /// Absolute path to the binary.
    pub path: PathBuf,
    /// Which candidate matched.
    pub source: InterpreterSource,
}

/// Inputs of the interpreter search.
#[derive(Debug, Clone, Default)]
pub struct InterpreterSearch<'a> {
    pub explicit: Option<&'a Path>,
    pub install_dir: Option<&'a Path>,
    pub script_dir: Option<&'a Path>,
    pub user_env_dir: Option<&'a Path>,
}

impl InterpreterSearch<'_> {
    /// Resolve the interpreter used to launch a bundled script.
    ///
    /// Probes locations in this order:
    /// 1. the explicit override (taken as-is)
    /// 2. `<install_dir>/backend/.venv/bin/python3`
    /// 3. `<script_dir>/.venv/bin/python3`
    /// 4. `<user_env_dir>/bin/python3`
    /// 5. `PATH` lookup via [`which::which`]
    #[must_use]
    pub fn resolve(&self) -> Option<ResolvedInterpreter> {
        if let Some(path) = self.explicit {
            return Some(ResolvedInterpreter {
                path: path.to_path_buf(),
                source: InterpreterSource::Override,
            });
        }

        self.candidates()
            .into_iter()
            .find(|(path, _)| path.is_file())
            .map(|(path, source)| ResolvedInterpreter { path, source })
            .or_else(|| {
                which::which(INTERPRETER_NAME)
                    .ok()
                    .map(|path| ResolvedInterpreter {
                        path,
                        source: InterpreterSource::SystemPath,
                    })
            })
    }

    /// Ordered on-disk candidates, excluding the override and `PATH`.
    fn candidates(&self) -> Vec<(PathBuf, InterpreterSource)> {
        let mut candidates = Vec::with_capacity(3);
        if let Some(dir) = self.install_dir {
            candidates.push((
                venv_binary(&dir.join("backend").join(".venv")),
                InterpreterSource::InstallDir,
            ));
        }
        if let Some(dir) = self.script_dir {
            candidates.push((venv_binary(&dir.join(".venv")), InterpreterSource::ScriptDir));
        }
        if let Some(dir) = self.user_env_dir {
            candidates.push((venv_binary(dir), InterpreterSource::UserEnv));
        }
        candidates
    }
}

fn venv_binary(venv: &Path) -> PathBuf {
    venv.join("bin").join(INTERPRETER_NAME)
}

/// Locate `<name>.py` under `scripts_dir`.
///
/// Checks the directory itself, `Backend/`, `Resources/Backend/`, then a
/// bounded recursive walk that skips hidden directories.
#[must_use]
pub fn find_script(scripts_dir: &Path, name: &str) -> Option<PathBuf> {
    let file_name = format!("{name}.py");
    let direct = [
        scripts_dir.join(&file_name),
        scripts_dir.join("Backend").join(&file_name),
        scripts_dir.join("Resources").join("Backend").join(&file_name),
    ];
    if let Some(found) = direct.into_iter().find(|p| p.is_file()) {
        return Some(found);
    }
    search_dir(scripts_dir, &file_name, SCRIPT_SEARCH_DEPTH)
}

fn search_dir(dir: &Path, file_name: &str, depth: usize) -> Option<PathBuf> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let mut subdirs = Vec::new();
    for path in entries {
        if path.is_dir() {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if !hidden {
                subdirs.push(path);
            }
        } else if path.file_name().and_then(|n| n.to_str()) == Some(file_name) {
            return Some(path);
        }
    }

    if depth == 0 {
        return None;
    }
    subdirs
        .iter()
        .find_map(|sub| search_dir(sub, file_name, depth - 1))
}

/// Directory containing the running executable.
#[must_use]
pub fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}
