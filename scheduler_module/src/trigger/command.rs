use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::scheduler::SchedulerError;

const PIPE_GRACE: Duration = Duration::from_secs(2);

pub(crate) fn tail_string(input: &str, max_len: usize) -> String {
    let trimmed = input.trim();
    if trimmed.len() <= max_len {
        return trimmed.to_string();
    }
    let mut start = trimmed.len().saturating_sub(max_len);
    while start < trimmed.len() && !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

/// Stdout and stderr of a finished OS call, joined for diagnostics.
pub(crate) fn combined_output(output: &Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    if !output.stderr.is_empty() {
        if !combined.trim().is_empty() {
            combined.push('\n');
        }
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
    }
    tail_string(&combined, 2000)
}

/// Runs an OS command, killing it once `timeout` elapses. A timeout is
/// reported through `on_timeout` so each caller picks its error variant.
/// Both pipes are drained while the child runs so a chatty child never
/// blocks on a full pipe.
pub(crate) fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
    on_timeout: fn(String) -> SchedulerError,
) -> Result<Output, SchedulerError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let start = Instant::now();

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Output {
                status,
                stdout: collect(stdout),
                stderr: collect(stderr),
            });
        }

        if start.elapsed() >= timeout {
            let _ = child.kill();
            let status = child.wait()?;
            let output = Output {
                status,
                stdout: collect(stdout),
                stderr: collect(stderr),
            };
            return Err(on_timeout(format!(
                "{} timed out after {}s: {}",
                label,
                timeout.as_secs(),
                combined_output(&output)
            )));
        }

        thread::sleep(Duration::from_millis(100));
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

/// A grandchild that inherited the pipe can keep it open after the child
/// is gone, so the reader gets a short grace period and is then abandoned.
fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(handle) = reader else {
        return Vec::new();
    };
    let deadline = Instant::now() + PIPE_GRACE;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    if !handle.is_finished() {
        return Vec::new();
    }
    handle.join().unwrap_or_default()
}
