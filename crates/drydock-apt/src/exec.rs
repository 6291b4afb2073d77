//! Execution context for external tool invocations.
//!
//! Every apt-family process is spawned with the same pinned environment:
//! `APT_CONFIG` pointing at the workspace apt tree, a noninteractive debconf
//! frontend, and the C locale so output stays parseable.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::AptError;

/// Where the apt configuration lives and whether filesystem operations that
/// touch root-owned paths need to go through `sudo`.
#[derive(Debug, Clone)]
pub struct ExecContext {
    apt_config: PathBuf,
    elevate: bool,
}

impl ExecContext {
    /// Context for the calling process. Elevation is needed exactly when the
    /// process is not already running as root.
    pub fn for_current_user(apt_config: PathBuf) -> Self {
        Self {
            apt_config,
            elevate: !process_is_root(),
        }
    }

    /// Context with an explicit elevation choice. Used by tests and by
    /// callers that already know they are root.
    pub fn with_elevation(apt_config: PathBuf, elevate: bool) -> Self {
        Self { apt_config, elevate }
    }

    pub fn apt_config(&self) -> &Path {
        &self.apt_config
    }

    pub fn needs_elevation(&self) -> bool {
        self.elevate
    }

    /// An apt-family command with the pinned noninteractive environment.
    pub fn apt_command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.env("APT_CONFIG", &self.apt_config)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .env("DEBCONF_NONINTERACTIVE_SEEN", "true")
            .env("LC_ALL", "C")
            .env("LANGUAGE", "C")
            .env("LANG", "C");
        cmd
    }

    /// A command that must run as root, prefixed with `sudo` when the
    /// current process is unprivileged.
    pub fn root_command(&self, program: &str) -> Command {
        if self.elevate {
            let mut cmd = Command::new("sudo");
            cmd.arg(program);
            cmd
        } else {
            Command::new(program)
        }
    }
}

#[allow(unsafe_code)]
fn process_is_root() -> bool {
    // SAFETY: geteuid only reads process credentials and cannot fail.
    let euid = unsafe { libc::geteuid() };
    euid == 0
}

/// Run a command to completion, discarding output on success.
pub fn run(cmd: &mut Command) -> Result<(), AptError> {
    let rendered = render(cmd);
    debug!("running {rendered}");
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(command_failed(&rendered, &output));
    }
    Ok(())
}

/// Run a command and capture its stdout as text.
pub fn read(cmd: &mut Command) -> Result<String, AptError> {
    let rendered = render(cmd);
    debug!("running {rendered}");
    let output = cmd.output()?;
    if !output.status.success() {
        return Err(command_failed(&rendered, &output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn render(cmd: &Command) -> String {
    let mut rendered = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

fn command_failed(command: &str, output: &Output) -> AptError {
    let mut captured = String::from_utf8_lossy(&output.stdout).trim_end().to_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim_end();
    if !stderr.is_empty() {
        if !captured.is_empty() {
            captured.push('\n');
        }
        captured.push_str(stderr);
    }
    AptError::CommandFailed {
        command: command.to_owned(),
        status: output.status.to_string(),
        output: captured,
    }
}
