//! Spawns a headless Chrome/Chromium process directly (rather than going
//! through chromiumoxide's own launcher) so the pool can retain the real
//! OS pid for the SIGTERM/SIGKILL cleanup protocol.

use compliscan_core::{Error, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

/// A process just spawned, with the CDP connection established.
pub struct LaunchedBrowser {
    pub browser: chromiumoxide::Browser,
    pub handler: tokio::task::JoinHandle<()>,
    pub child: Child,
    pub pid: u32,
}

pub struct Launcher {
    binary: String,
    headless: bool,
}

impl Launcher {
    pub fn new(binary: impl Into<String>, headless: bool) -> Self {
        Self {
            binary: binary.into(),
            headless,
        }
    }

    /// Find a Chrome/Chromium binary on `PATH`, preferring the names most
    /// Linux distributions ship.
    pub fn detect() -> Self {
        for candidate in [
            "google-chrome-stable",
            "google-chrome",
            "chromium-browser",
            "chromium",
        ] {
            if which(candidate) {
                return Self::new(candidate, true);
            }
        }
        Self::new("chromium", true)
    }

    pub async fn launch(&self) -> Result<LaunchedBrowser> {
        let user_data_dir = std::env::temp_dir().join(format!(
            "compliscan-browser-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&user_data_dir).map_err(|e| Error::BrowserLaunch {
            message: format!("failed to create profile dir: {e}"),
        })?;

        let mut command = Command::new(&self.binary);
        command
            .arg("--remote-debugging-port=0")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-data-dir={}", user_data_dir.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if self.headless {
            command.arg("--headless=new");
        }

        let mut child = command.spawn().map_err(|e| Error::BrowserLaunch {
            message: format!("failed to spawn {}: {e}", self.binary),
        })?;

        let pid = child.id().ok_or_else(|| Error::BrowserLaunch {
            message: "spawned browser process has no pid".to_string(),
        })?;

        let stderr = child.stderr.take().ok_or_else(|| Error::BrowserLaunch {
            message: "browser process stderr was not captured".to_string(),
        })?;
        let ws_url = read_devtools_endpoint(stderr).await?;

        let (browser, mut handler) =
            chromiumoxide::Browser::connect(ws_url)
                .await
                .map_err(|e| Error::BrowserLaunch {
                    message: format!("failed to connect over CDP: {e}"),
                })?;

        let handler_task = tokio::spawn(async move {
            use futures::StreamExt;
            while handler.next().await.is_some() {}
        });

        Ok(LaunchedBrowser {
            browser,
            handler: handler_task,
            child,
            pid,
        })
    }
}

async fn read_devtools_endpoint(stderr: tokio::process::ChildStderr) -> Result<String> {
    const PREFIX: &str = "DevTools listening on ";
    let mut lines = BufReader::new(stderr).lines();

    let deadline = tokio::time::Duration::from_secs(20);
    tokio::time::timeout(deadline, async {
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| Error::BrowserLaunch {
                message: format!("reading browser stderr: {e}"),
            })?
        {
            if let Some(url) = line.strip_prefix(PREFIX) {
                return Ok(url.trim().to_string());
            }
        }
        Err(Error::BrowserLaunch {
            message: "browser process exited before printing a DevTools endpoint".to_string(),
        })
    })
    .await
    .map_err(|_| Error::BrowserLaunch {
        message: "timed out waiting for the DevTools endpoint".to_string(),
    })?
}

fn which(binary: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file())
        })
        .unwrap_or(false)
}
