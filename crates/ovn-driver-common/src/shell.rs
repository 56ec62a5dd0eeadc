//! Shell command execution for host interface primitives.
//!
//! Host wiring is done through the standard Linux and Open vSwitch command
//! line tools. Every argument that originates from an orchestrator request
//! (endpoint identifiers, MAC addresses, port names) goes through
//! [`shellquote`] before it reaches `/bin/sh`.
//!
//! # Example
//!
//! ```ignore
//! use ovn_driver_common::shell::{self, IP_CMD, shellquote};
//!
//! let cmd = format!("{} link set {} up", IP_CMD, shellquote("veth0123456"));
//! shell::exec_or_throw(&cmd).await?;
//! ```

use std::process::{Output, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use crate::error::{DriverError, DriverResult};

/// Path to the `ip` command for link configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to the `ovs-vsctl` command for local switch configuration.
pub const OVS_VSCTL_CMD: &str = "/usr/bin/ovs-vsctl";

/// Path to the `ethtool` command for offload settings.
pub const ETHTOOL_CMD: &str = "/sbin/ethtool";

/// Exit code reported when the process was killed by a signal.
const SIGNALLED: i32 = -1;

/// `$`, `` ` ``, `"`, `\` and newline keep their meaning inside double quotes.
static DOUBLE_QUOTE_SPECIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("static pattern compiles"));

/// Wraps `arg` in double quotes, backslash-escaping what the shell would
/// still expand there.
///
/// ```
/// use ovn_driver_common::shell::shellquote;
///
/// assert_eq!(shellquote("veth0123456_c"), "\"veth0123456_c\"");
/// assert_eq!(shellquote("lsp-$x"), "\"lsp-\\$x\"");
/// ```
pub fn shellquote(arg: &str) -> String {
    format!("\"{}\"", DOUBLE_QUOTE_SPECIAL.replace_all(arg, r"\$1"))
}

/// Exit status and trimmed output of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        let text = |bytes: &[u8]| String::from_utf8_lossy(bytes).trim().to_string();
        Self {
            exit_code: output.status.code().unwrap_or(SIGNALLED),
            stdout: text(&output.stdout),
            stderr: text(&output.stderr),
        }
    }
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty streams joined by a newline, stdout first.
    pub fn combined_output(&self) -> String {
        [self.stdout.as_str(), self.stderr.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs `cmd` through `/bin/sh -c`.
///
/// Only a spawn failure is an `Err`; a non-zero exit comes back in
/// [`ExecResult::exit_code`].
pub async fn exec(cmd: &str) -> DriverResult<ExecResult> {
    tracing::debug!(command = %cmd, "Running host command");

    let result: ExecResult = Command::new("/bin/sh")
        .args(["-c", cmd])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| DriverError::ShellExec {
            command: cmd.to_string(),
            source,
        })?
        .into();

    if !result.success() {
        tracing::warn!(
            command = %cmd,
            exit_code = result.exit_code,
            stderr = %result.stderr,
            "Host command exited non-zero"
        );
    }
    Ok(result)
}

/// Runs `cmd` and returns its stdout, failing on a non-zero exit.
pub async fn exec_or_throw(cmd: &str) -> DriverResult<String> {
    let result = exec(cmd).await?;
    if !result.success() {
        return Err(DriverError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        });
    }
    Ok(result.stdout)
}
