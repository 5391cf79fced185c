//! Client for the external voxel storage server
//!
//! The server is only reachable through its command-line interface. Every
//! call here is one subprocess; `serve` is the only long-lived one.

use crate::config::{InvocationStyle, ServerSettings};
use crate::error::{ImportError, Result};
use crate::types::Point3d;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Prefix of the `init` output line carrying the root version
pub const ROOT_UUID_MARKER: &str = "Root node UUID:";

/// Root version identifier returned by `init`, target of every import
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatastoreHandle(String);

impl DatastoreHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatastoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the version token from a single line of `init` output
pub fn parse_root_uuid_line(line: &str) -> Option<&str> {
    line.trim_start()
        .strip_prefix(ROOT_UUID_MARKER)
        .and_then(|rest| rest.split_whitespace().next())
}

/// Scan at most `max_lines` lines for the root version marker.
///
/// Fails once the stream closes or the line budget runs out without a match.
pub async fn read_root_uuid<R>(reader: &mut R, max_lines: usize) -> Result<DatastoreHandle>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    for _ in 0..max_lines {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(ImportError::Protocol(
                "init output ended without a root version UUID".to_string(),
            ));
        }
        if let Some(token) = parse_root_uuid_line(&line) {
            return Ok(DatastoreHandle::new(token));
        }
        debug!(line = line.trim_end(), "init output");
    }
    Err(ImportError::Protocol(format!(
        "no root version UUID in the first {} lines of init output",
        max_lines
    )))
}

/// Operations the importers need from the storage server
#[async_trait]
pub trait ServerClient: Send + Sync {
    /// Create a datastore in `output_dir` and return its root version
    async fn init(&self, output_dir: &Path, config: Option<&Path>) -> Result<DatastoreHandle>;

    /// Start a server for `output_dir` in the background
    async fn serve(&self, output_dir: &Path) -> Result<()>;

    /// Create a named dataset of the given value type
    async fn create_dataset(&self, name: &str, type_name: &str) -> Result<String>;

    /// Add one tile at a voxel offset; blocks until the server is done with it
    async fn server_add(
        &self,
        dataset: &str,
        uuid: &DatastoreHandle,
        offset: Point3d,
        tile: &Path,
    ) -> Result<String>;

    /// Stop the running server
    async fn shutdown(&self) -> Result<()>;
}

/// `ServerClient` that shells out to the server executable
#[derive(Debug, Clone)]
pub struct CliServer {
    settings: ServerSettings,
    style: InvocationStyle,
}

impl CliServer {
    pub fn new(settings: ServerSettings, style: InvocationStyle) -> Self {
        Self { settings, style }
    }

    fn command(&self, args: &[OsString]) -> Command {
        let mut cmd = Command::new(&self.settings.executable);
        cmd.args(args).stdin(Stdio::null());
        // Keep a terminal Ctrl-C from reaching the server commands; the
        // import loop decides when to stop and shuts the server down itself.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    fn describe(&self, args: &[OsString]) -> String {
        std::iter::once(self.settings.executable.as_os_str())
            .chain(args.iter().map(OsString::as_os_str))
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn datastore_args(&self, verb: &str, output_dir: &Path, config: Option<&Path>) -> Vec<OsString> {
        match self.style {
            InvocationStyle::KeyValue => {
                let mut args = vec![OsString::from(verb)];
                if let Some(config) = config {
                    let mut arg = OsString::from("config=");
                    arg.push(config);
                    args.push(arg);
                }
                let mut dir = OsString::from("dir=");
                dir.push(output_dir);
                args.push(dir);
                args
            }
            InvocationStyle::DatastoreFlag => {
                let mut flag = OsString::from("-datastore=");
                flag.push(output_dir);
                vec![flag, OsString::from(verb)]
            }
        }
    }

    /// Run a command to completion and return its standard output
    async fn run(&self, args: Vec<OsString>) -> Result<String> {
        let description = self.describe(&args);
        let output = self
            .command(&args)
            .output()
            .await
            .map_err(|source| ImportError::Spawn {
                command: description.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !stdout.trim().is_empty() {
            debug!(command = %description, output = stdout.trim_end(), "server output");
        }
        if !output.status.success() {
            return Err(ImportError::CommandFailed {
                command: description,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(stdout)
    }

    fn spawn(&self, args: &[OsString], stdout: Stdio) -> Result<Child> {
        self.command(args)
            .stdout(stdout)
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ImportError::Spawn {
                command: self.describe(args),
                source,
            })
    }
}

/// Wait for a background child in its own task and log how it ended
fn reap(mut child: Child, what: &'static str) {
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => debug!(what, "process exited"),
            Ok(status) => warn!(what, %status, "process exited unsuccessfully"),
            Err(e) => warn!(what, error = %e, "failed to wait for process"),
        }
    });
}

#[async_trait]
impl ServerClient for CliServer {
    async fn init(&self, output_dir: &Path, config: Option<&Path>) -> Result<DatastoreHandle> {
        let args = self.datastore_args("init", output_dir, config);
        let mut child = self.spawn(&args, Stdio::piped())?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ImportError::Protocol("init stdout was not captured".to_string())
        })?;

        let mut reader = BufReader::new(stdout);
        let result = read_root_uuid(&mut reader, self.settings.max_init_lines).await;

        // init may keep running after printing the UUID; keep its pipe drained.
        tokio::spawn(async move {
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(line = %line, "init output");
            }
        });
        reap(child, "init");
        result
    }

    async fn serve(&self, output_dir: &Path) -> Result<()> {
        let args = self.datastore_args("serve", output_dir, None);
        let child = self.spawn(&args, Stdio::null())?;
        info!(pid = ?child.id(), dir = %output_dir.display(), "Started storage server");
        reap(child, "serve");
        Ok(())
    }

    async fn create_dataset(&self, name: &str, type_name: &str) -> Result<String> {
        self.run(vec!["dataset".into(), name.into(), type_name.into()])
            .await
    }

    async fn server_add(
        &self,
        dataset: &str,
        uuid: &DatastoreHandle,
        offset: Point3d,
        tile: &Path,
    ) -> Result<String> {
        self.run(vec![
            dataset.into(),
            "server-add".into(),
            uuid.as_str().into(),
            offset.to_string().into(),
            tile.as_os_str().to_owned(),
        ])
        .await
    }

    async fn shutdown(&self) -> Result<()> {
        self.run(vec!["shutdown".into()]).await.map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Running,
    Stopped,
}

/// A started server whose shutdown runs at most once
///
/// The interrupt path and the normal exit path can both ask for shutdown;
/// only the first request reaches the server.
pub struct ServerSession {
    client: Arc<dyn ServerClient>,
    state: Mutex<SessionState>,
}

impl ServerSession {
    /// Wrap a client whose server has been started
    pub fn new(client: Arc<dyn ServerClient>) -> Self {
        Self {
            client,
            state: Mutex::new(SessionState::Running),
        }
    }

    pub fn client(&self) -> &dyn ServerClient {
        self.client.as_ref()
    }

    /// Issue `shutdown` if nobody has yet. Returns whether this call sent it.
    pub async fn shutdown(&self) -> Result<bool> {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Stopped {
                debug!("server already shut down");
                return Ok(false);
            }
            *state = SessionState::Stopped;
        }
        info!("Shutting down storage server");
        self.client.shutdown().await?;
        Ok(true)
    }
}
