//! CK-051: SSH execution transport for host-bound recipes.
//!
//! Uses the `ssh` binary directly. The command is piped to a remote `bash`
//! on stdin rather than passed as an argument.

use super::ExecOutput;
use crate::core::recipe::Host;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Expand a leading `~/` against `$HOME`.
fn expand_key(key: &str) -> String {
    match (key.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home, rest),
        _ => key.to_string(),
    }
}

fn ssh_args(host: &Host) -> Vec<String> {
    let mut args: Vec<String> = [
        "-o",
        "BatchMode=yes",
        "-o",
        "ConnectTimeout=5",
        "-o",
        "StrictHostKeyChecking=accept-new",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if let Some(key) = &host.ssh_key {
        args.push("-i".to_string());
        args.push(expand_key(key));
    }
    args.push(format!("{}@{}", host.user, host.addr));
    args.push("bash".to_string());
    args
}

/// Run a script on a remote host via SSH.
pub async fn exec_ssh(host: &Host, script: &str) -> Result<ExecOutput, String> {
    let mut child = Command::new("ssh")
        .args(ssh_args(host))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn ssh to {}: {}", host.addr, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(script.as_bytes())
            .await
            .map_err(|e| format!("stdin write error: {}", e))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| format!("ssh wait error: {}", e))?;

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
