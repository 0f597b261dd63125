//! Finding the launcher executable
//!
//! The launcher is looked up in its well-known per-user install locations
//! first and then through the platform's "find on PATH" utility. Lookup
//! never fails loudly: the answer is a path or nothing.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long the PATH lookup utility may run before it is killed
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Locates an executable by probing install directories, then `PATH`
#[derive(Debug, Clone)]
pub struct ExecutableLocator {
    name: String,
    home: Option<PathBuf>,
    /// Candidate locations relative to the home directory, in search order
    candidates: Vec<PathBuf>,
    search_timeout: Duration,
    path_lookup: bool,
}

impl ExecutableLocator {
    /// Locator for `name`, probing `~/.local/bin/<name>.exe` and
    /// `~/.local/bin/<name>` before `PATH`
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let bin = Path::new(".local").join("bin");
        let candidates = vec![bin.join(format!("{name}.exe")), bin.join(&name)];
        Self {
            name,
            home: dirs::home_dir(),
            candidates,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            path_lookup: true,
        }
    }

    /// Locator for the `uv` launcher, adding its standalone installer layout
    ///
    /// Every candidate is checked on every platform.
    pub fn uv() -> Self {
        Self::new("uv").with_candidate(Path::new("AppData").join("Local").join("uv").join("uv.exe"))
    }

    /// Probe relative to `home` instead of the user's home directory
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Add a candidate location relative to the home directory
    pub fn with_candidate(mut self, relative: impl Into<PathBuf>) -> Self {
        self.candidates.push(relative.into());
        self
    }

    /// Bound the PATH lookup by `timeout`
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// Skip the PATH lookup entirely
    pub fn without_path_lookup(mut self) -> Self {
        self.path_lookup = false;
        self
    }

    /// The executable name being searched for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute candidate paths in search order
    pub fn candidates(&self) -> Vec<PathBuf> {
        match &self.home {
            Some(home) => self.candidates.iter().map(|c| home.join(c)).collect(),
            None => Vec::new(),
        }
    }

    /// Find the executable, or `None` if it is nowhere to be found
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(found) = self.candidates().into_iter().find(|c| c.is_file()) {
            debug!(path = %found.display(), "found {} in install directory", self.name);
            return Some(found);
        }
        if !self.path_lookup {
            return None;
        }
        let found = self.search_path();
        match &found {
            Some(path) => debug!(path = %path.display(), "found {} on PATH", self.name),
            None => debug!("{} not found on PATH", self.name),
        }
        found
    }

    fn search_path(&self) -> Option<PathBuf> {
        let finder = if cfg!(windows) { "where" } else { "which" };
        let mut child = match std::process::Command::new(finder)
            .arg(&self.name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                debug!(error = %e, "could not run {finder}");
                return None;
            }
        };

        let status = wait_with_deadline(&mut child, self.search_timeout, finder)?;
        if !status.success() {
            return None;
        }

        let mut output = String::new();
        child.stdout.take()?.read_to_string(&mut output).ok()?;
        output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from)
    }
}

/// Poll `child` until it exits or `timeout` elapses, killing it on expiry
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
    finder: &str,
) -> Option<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() >= deadline => {
                warn!(?timeout, "{finder} did not finish in time");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                debug!(error = %e, "failed to wait for {finder}");
                let _ = child.kill();
                return None;
            }
        }
    }
}
