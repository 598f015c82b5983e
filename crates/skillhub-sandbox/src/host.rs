//! Host side of the guest contract.
//!
//! [`ProcessSandbox`] runs one staged guest per invocation: private scratch
//! directory, sanitized environment, per-launch [`GuestIsolation`], inputs
//! JSON on stdin, capped stdout read, wall-clock deadline with SIGTERM
//! then SIGKILL.
//!
//! The [`SandboxHost`] trait is the seam the engine consumes; tests supply
//! in-process stubs instead of spawning interpreters.

use crate::caps::ResourceCaps;
use crate::harness::{self, GuestLanguage, EXIT_MARSHALLING, RESULT_SENTINEL};
use crate::isolation::GuestIsolation;
use crate::outcome::GuestFailure;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// How much of the guest's stderr is kept as the failure traceback.
const TRACEBACK_TAIL_BYTES: usize = 4096;

/// Grace period between SIGTERM and SIGKILL on deadline expiry.
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Launches one guest execution. Implemented by [`ProcessSandbox`] in
/// production and by in-process stubs in engine tests.
#[async_trait]
pub trait SandboxHost: Send + Sync {
    async fn launch(
        &self,
        language: GuestLanguage,
        blob: &[u8],
        input: &Value,
        caps: &ResourceCaps,
    ) -> Result<Value, GuestFailure>;
}

/// Subprocess-based sandbox host.
///
/// Each launch stages the blob into a fresh temp dir that is the only
/// writable path the guest sees; network sockets are denied at the kernel
/// where the platform supports it. Deployments wanting a stronger process
/// namespace boundary run the whole server inside a container, which this
/// host composes with.
#[derive(Debug, Default)]
pub struct ProcessSandbox {
    /// Parent directory for guest scratch dirs; system temp when unset.
    scratch_root: Option<PathBuf>,
}

impl ProcessSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scratch_root(root: PathBuf) -> Self {
        Self {
            scratch_root: Some(root),
        }
    }
}

#[async_trait]
impl SandboxHost for ProcessSandbox {
    async fn launch(
        &self,
        language: GuestLanguage,
        blob: &[u8],
        input: &Value,
        caps: &ResourceCaps,
    ) -> Result<Value, GuestFailure> {
        let scratch = match &self.scratch_root {
            Some(root) => tempfile::Builder::new()
                .prefix("skillhub-guest-")
                .tempdir_in(root),
            None => tempfile::Builder::new().prefix("skillhub-guest-").tempdir(),
        }
        .map_err(|e| GuestFailure::Unavailable(format!("scratch dir: {e}")))?;

        let guest_cmd = harness::stage_guest(scratch.path(), language, blob)
            .map_err(|e| GuestFailure::Unavailable(format!("stage guest: {e}")))?;

        let isolation = GuestIsolation::for_launch(scratch.path(), caps);
        let (program, args) = isolation.command_line(&guest_cmd);

        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(scratch.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .env_clear()
            .env("PATH", std::env::var("PATH").unwrap_or_default())
            .env("LANG", "C.UTF-8")
            .env("HOME", scratch.path());

        if language == GuestLanguage::Go {
            command
                .env("GOCACHE", scratch.path().join(".gocache"))
                .env("GOPATH", scratch.path().join(".gopath"))
                .env("GOFLAGS", "-mod=mod");
        }

        #[cfg(unix)]
        {
            let child_isolation = isolation.clone();
            unsafe {
                command.pre_exec(move || child_isolation.apply_in_child());
            }
        }

        debug!(%language, program = %program, "Launching guest");

        let mut child = command
            .spawn()
            .map_err(|e| GuestFailure::Unavailable(format!("spawn {program}: {e}")))?;

        // Null inputs are legal and arrive at the guest as an empty object.
        let input_json = if input.is_null() {
            b"{}".to_vec()
        } else {
            serde_json::to_vec(input)
                .map_err(|e| GuestFailure::MarshallingFailed(format!("encode inputs: {e}")))?
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&input_json).await {
                warn!(error = %e, "Failed to hand inputs to guest");
            }
            drop(stdin);
        }

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");
        let stdout_cap = caps.max_output_bytes;
        let stderr_cap = caps.max_output_bytes / 4;

        let deadline = Duration::from_secs(caps.max_wall_seconds);
        let run = tokio::time::timeout(deadline, async {
            let (out, err) = tokio::join!(
                read_capped(stdout, stdout_cap),
                read_capped(stderr, stderr_cap),
            );
            let status = child.wait().await;
            (out, err, status)
        })
        .await;

        let ((stdout_buf, stdout_truncated), (stderr_buf, _), status) = match run {
            Ok(parts) => parts,
            Err(_elapsed) => {
                terminate(&mut child).await;
                return Err(GuestFailure::TimedOut(caps.max_wall_seconds));
            }
        };

        let status =
            status.map_err(|e| GuestFailure::Unavailable(format!("wait on guest: {e}")))?;

        if stdout_truncated {
            return Err(GuestFailure::OversizeOutput(stdout_cap));
        }

        if status.code() == Some(EXIT_MARSHALLING) {
            return Err(GuestFailure::MarshallingFailed(tail(&stderr_buf)));
        }

        if !status.success() {
            return Err(GuestFailure::ExecutionFailed {
                traceback: tail(&stderr_buf),
            });
        }

        let text = String::from_utf8(stdout_buf)
            .map_err(|_| GuestFailure::MarshallingFailed("guest emitted non-UTF-8 output".into()))?;

        let frame = text
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix(RESULT_SENTINEL))
            .ok_or_else(|| {
                GuestFailure::MarshallingFailed("guest produced no result frame".into())
            })?;

        serde_json::from_str(frame)
            .map_err(|e| GuestFailure::MarshallingFailed(format!("decode result: {e}")))
    }
}

/// Read a stream up to `cap` bytes; past the cap, keep draining so the
/// guest never blocks on a full pipe, but discard the data and flag it.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> (Vec<u8>, bool) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if truncated {
                    continue;
                }
                if buf.len() + n > cap {
                    truncated = true;
                    continue;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(_) => break,
        }
    }
    (buf, truncated)
}

/// SIGTERM, short grace, then SIGKILL.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill guest process");
    }
}

/// Last chunk of a (possibly truncated) stderr buffer, lossily decoded.
fn tail(buf: &[u8]) -> String {
    let start = buf.len().saturating_sub(TRACEBACK_TAIL_BYTES);
    String::from_utf8_lossy(&buf[start..]).into_owned()
}
