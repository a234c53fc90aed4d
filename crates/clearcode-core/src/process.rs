//! Best-effort external command queries.
//!
//! Every question the engine asks `git` or `gh` goes through [`query`]. The
//! command runs with a null stdin and a discarded stderr, and its trimmed
//! stdout is the answer. A binary that cannot be started, a non-zero exit, a
//! timeout or empty output all count as "no answer"; none of them is an error.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// Default time a single external query may take before it counts as absent.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs `program args...` in `cwd` and returns its trimmed stdout.
///
/// Returns `None` when the command cannot be spawned (missing binary or
/// missing directory), exits unsuccessfully, exceeds `timeout`, or prints
/// nothing but whitespace. A timed-out child is killed.
pub async fn query(program: &str, args: &[&str], cwd: &Path, timeout: Duration) -> Option<String> {
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!(
                program,
                ?args,
                cwd = %cwd.display(),
                error = %e,
                "Command could not be started"
            );
            return None;
        }
        Err(_) => {
            debug!(program, ?args, cwd = %cwd.display(), "Command timed out");
            return None;
        }
    };

    if !output.status.success() {
        debug!(
            program,
            ?args,
            cwd = %cwd.display(),
            status = %output.status,
            "Command exited unsuccessfully"
        );
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}
