//! Driver process management.
//!
//! Locates and runs the Node.js driver the client talks to. The driver is
//! spawned with piped stdin/stdout; those pipes are handed to the transport
//! layer and all further traffic is length-prefixed JSON frames.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::{Error, Result};

/// Locates the driver executable.
///
/// Search order:
/// 1. `WEBPILOT_NODE_EXE` and `WEBPILOT_CLI_JS` (explicit node + cli.js)
/// 2. `WEBPILOT_DRIVER_PATH` (directory holding `node` and `package/cli.js`)
/// 3. Global npm installation of the `playwright` package (`npm root -g`)
/// 4. Local npm installation (`npm root`)
///
/// Returns `(node_executable, cli_js)`.
pub fn locate_driver() -> Result<(PathBuf, PathBuf)> {
	if let Some(paths) = try_node_cli_env() {
		return Ok(paths);
	}
	if let Some(paths) = try_driver_path_env() {
		return Ok(paths);
	}
	if let Some(paths) = try_npm_root(true) {
		return Ok(paths);
	}
	if let Some(paths) = try_npm_root(false) {
		return Ok(paths);
	}
	Err(Error::DriverNotFound)
}

fn try_node_cli_env() -> Option<(PathBuf, PathBuf)> {
	let node = PathBuf::from(std::env::var_os("WEBPILOT_NODE_EXE")?);
	let cli = PathBuf::from(std::env::var_os("WEBPILOT_CLI_JS")?);
	if node.exists() && cli.exists() {
		tracing::debug!(node = %node.display(), cli = %cli.display(), "driver from WEBPILOT_NODE_EXE/WEBPILOT_CLI_JS");
		Some((node, cli))
	} else {
		tracing::warn!(
			node = %node.display(),
			cli = %cli.display(),
			"WEBPILOT_NODE_EXE/WEBPILOT_CLI_JS set but paths do not exist"
		);
		None
	}
}

fn try_driver_path_env() -> Option<(PathBuf, PathBuf)> {
	let dir = PathBuf::from(std::env::var_os("WEBPILOT_DRIVER_PATH")?);
	let node = dir.join(node_binary_name());
	let cli = dir.join("package").join("cli.js");
	if node.exists() && cli.exists() {
		tracing::debug!(node = %node.display(), cli = %cli.display(), "driver from WEBPILOT_DRIVER_PATH");
		Some((node, cli))
	} else {
		tracing::warn!(
			dir = %dir.display(),
			"WEBPILOT_DRIVER_PATH set but node or cli.js missing"
		);
		None
	}
}

/// Looks for the `playwright` npm package under `npm root [-g]`, driving it
/// with whatever `node` is on PATH.
fn try_npm_root(global: bool) -> Option<(PathBuf, PathBuf)> {
	let mut cmd = std::process::Command::new("npm");
	cmd.arg("root");
	if global {
		cmd.arg("-g");
	}
	let output = cmd.output().ok()?;
	if !output.status.success() {
		return None;
	}

	let root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
	let cli = root.join("playwright").join("cli.js");
	if !cli.exists() {
		return None;
	}
	let node = find_node_on_path()?;
	tracing::debug!(
		node = %node.display(),
		cli = %cli.display(),
		global,
		"driver from npm installation"
	);
	Some((node, cli))
}

fn find_node_on_path() -> Option<PathBuf> {
	let name = node_binary_name();
	let paths = std::env::var_os("PATH")?;
	std::env::split_paths(&paths)
		.map(|dir| dir.join(name))
		.find(|candidate| candidate.exists())
}

fn node_binary_name() -> &'static str {
	if cfg!(windows) { "node.exe" } else { "node" }
}

/// A running driver child process.
///
/// Communication happens over the stdio pipes; take them with
/// [`take_pipes`](Self::take_pipes) and feed them to the transport.
#[derive(Debug)]
pub struct DriverProcess {
	process: Child,
}

impl DriverProcess {
	/// Launches the driver in run-driver mode with piped stdio.
	///
	/// Fails with [`Error::DriverNotFound`] if no driver can be located and
	/// [`Error::LaunchFailed`] if the process dies at startup.
	pub async fn launch() -> Result<Self> {
		let (node_exe, cli_js) = locate_driver()?;

		tracing::info!(node = %node_exe.display(), cli = %cli_js.display(), "launching driver");

		let mut cmd = Command::new(&node_exe);
		cmd.arg(&cli_js)
			.arg("run-driver")
			.env("PW_LANG_NAME", "rust")
			.env("PW_CLI_DISPLAY_VERSION", env!("CARGO_PKG_VERSION"))
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit());

		let mut child = cmd
			.spawn()
			.map_err(|e| Error::LaunchFailed(format!("failed to spawn driver: {e}")))?;

		// Catch immediate startup failures (bad node binary, missing deps).
		tokio::time::sleep(Duration::from_millis(100)).await;
		match child.try_wait() {
			Ok(Some(status)) => {
				return Err(Error::LaunchFailed(format!(
					"driver exited immediately with status {status}"
				)));
			}
			Ok(None) => {}
			Err(e) => {
				return Err(Error::LaunchFailed(format!(
					"failed to check driver status: {e}"
				)));
			}
		}

		Ok(Self { process: child })
	}

	/// Takes the stdio pipes for the transport layer. Each pipe can be
	/// taken once.
	pub fn take_pipes(&mut self) -> Result<(ChildStdin, ChildStdout)> {
		let stdin = self
			.process
			.stdin
			.take()
			.ok_or_else(|| Error::LaunchFailed("driver stdin already taken".to_string()))?;
		let stdout = self
			.process
			.stdout
			.take()
			.ok_or_else(|| Error::LaunchFailed("driver stdout already taken".to_string()))?;
		Ok((stdin, stdout))
	}

	/// Shuts the driver down and waits for it to exit.
	///
	/// On Windows the stdio pipes must be dropped before the kill: tokio
	/// services child stdio through a blocking threadpool there, and a live
	/// pipe can make the wait hang.
	pub async fn shutdown(mut self) -> Result<()> {
		drop(self.process.stdin.take());
		drop(self.process.stdout.take());
		drop(self.process.stderr.take());

		self.process
			.kill()
			.await
			.map_err(|e| Error::LaunchFailed(format!("failed to kill driver: {e}")))?;

		match tokio::time::timeout(Duration::from_secs(5), self.process.wait()).await {
			Ok(Ok(status)) => {
				tracing::debug!(%status, "driver exited");
				Ok(())
			}
			Ok(Err(e)) => Err(Error::LaunchFailed(format!("failed to wait for driver: {e}"))),
			Err(_) => {
				let _ = self.process.start_kill();
				Err(Error::LaunchFailed("driver did not exit within 5s".to_string()))
			}
		}
	}

	/// Returns the driver's process ID, if still running.
	pub fn id(&self) -> Option<u32> {
		self.process.id()
	}
}
