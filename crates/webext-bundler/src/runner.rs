//! The extension-runner collaborator.
//!
//! Watch mode drives a real browser so the developer sees the rebuilt
//! extension without manual reloads. The orchestrator only depends on the
//! capability interface; the process-spawning implementation below is the
//! default, and tests use [`NoopRunner`].

use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use parking_lot::Mutex;

/// How the target browser is launched and told about the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    /// Chrome, Chromium, Edge, Brave: `--load-extension` on launch.
    Chromium,
    /// Firefox: launched plain; temporary add-ons load via
    /// `about:debugging`.
    Firefox,
}

/// Capability interface the orchestrator drives after settled watch
/// cycles.
pub trait ExtensionRunner: Send + Sync {
    /// Launch a browser with the built extension at `out_dir`.
    fn open_browser(&self, out_dir: &Path, family: BrowserFamily) -> anyhow::Result<()>;

    /// The extension was rebuilt; make the running browser pick it up.
    fn reload(&self) -> anyhow::Result<()>;

    /// Tear the browser down.
    fn exit(&self);
}

/// Runner that does nothing. Used in tests and headless environments.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRunner;

impl ExtensionRunner for NoopRunner {
    fn open_browser(&self, _out_dir: &Path, _family: BrowserFamily) -> anyhow::Result<()> {
        Ok(())
    }

    fn reload(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn exit(&self) {}
}

const CHROMIUM_BINARIES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

const FIREFOX_BINARIES: &[&str] = &["firefox", "firefox-esr"];

struct Launch {
    out_dir: PathBuf,
    family: BrowserFamily,
}

/// Default runner: locate a browser binary on `PATH` and spawn it against
/// the unpacked extension directory. Reload is a relaunch: unpacked
/// extensions are re-read from disk on startup, and a protocol-level
/// reload is out of scope here.
#[derive(Default)]
pub struct ProcessRunner {
    child: Mutex<Option<Child>>,
    launch: Mutex<Option<Launch>>,
}

impl std::fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProcessRunner")
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn locate(family: BrowserFamily) -> anyhow::Result<PathBuf> {
        let candidates = match family {
            BrowserFamily::Chromium => CHROMIUM_BINARIES,
            BrowserFamily::Firefox => FIREFOX_BINARIES,
        };
        for candidate in candidates {
            if let Ok(path) = which::which(candidate) {
                return Ok(path);
            }
        }
        anyhow::bail!(
            "no {:?} browser found on PATH (tried: {})",
            family,
            candidates.join(", ")
        )
    }

    fn spawn(&self, out_dir: &Path, family: BrowserFamily) -> anyhow::Result<()> {
        let binary = Self::locate(family)?;
        let mut command = Command::new(&binary);
        match family {
            BrowserFamily::Chromium => {
                command
                    .arg("--no-first-run")
                    .arg(format!("--load-extension={}", out_dir.display()));
            }
            BrowserFamily::Firefox => {
                tracing::warn!(
                    "firefox cannot sideload unpacked extensions from the command line; \
                     load {} as a temporary add-on via about:debugging",
                    out_dir.display()
                );
            }
        }

        tracing::info!("launching {} for {}", binary.display(), out_dir.display());
        let child = command.spawn().map_err(|e| {
            anyhow::anyhow!("failed to launch browser '{}': {e}", binary.display())
        })?;
        *self.child.lock() = Some(child);
        Ok(())
    }

    fn kill(&self) {
        if let Some(mut child) = self.child.lock().take() {
            if let Err(e) = child.kill() {
                tracing::debug!("browser process already gone: {e}");
            }
            let _ = child.wait();
        }
    }
}

impl ExtensionRunner for ProcessRunner {
    fn open_browser(&self, out_dir: &Path, family: BrowserFamily) -> anyhow::Result<()> {
        *self.launch.lock() = Some(Launch {
            out_dir: out_dir.to_path_buf(),
            family,
        });
        self.spawn(out_dir, family)
    }

    fn reload(&self) -> anyhow::Result<()> {
        let (out_dir, family) = {
            let launch = self.launch.lock();
            match launch.as_ref() {
                Some(l) => (l.out_dir.clone(), l.family),
                None => anyhow::bail!("reload called before open_browser"),
            }
        };
        self.kill();
        self.spawn(&out_dir, family)
    }

    fn exit(&self) {
        self.kill();
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_runner_is_inert() {
        let runner = NoopRunner;
        runner
            .open_browser(Path::new("/dist"), BrowserFamily::Chromium)
            .unwrap();
        runner.reload().unwrap();
        runner.exit();
    }

    #[test]
    fn test_reload_before_open_is_an_error() {
        let runner = ProcessRunner::new();
        assert!(runner.reload().is_err());
    }
}
