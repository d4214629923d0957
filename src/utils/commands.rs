use color_eyre::Result;
use color_eyre::eyre::{OptionExt, WrapErr, eyre};
use std::ffi::{OsStr, OsString};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Executes a command and returns its output.
///
/// Arguments are passed to the process as-is, no shell is involved. The child is killed if it
/// does not finish within `timeout`.
///
/// # Arguments
///
/// * `cmd` - The command to execute.
/// * `args` - Arguments for the command.
/// * `timeout` - Upper bound for the whole execution.
///
/// # Errors
/// Returns an error if the command fails to spawn or does not finish in time. A non-zero exit
/// status is not an error; inspect [`Output::status`].
pub(crate) async fn exec_output<S, I>(cmd: S, args: I, timeout: Duration) -> Result<Output>
where
    S: AsRef<OsStr>,
    I: IntoIterator<Item = S>,
{
    let cmd_os = cmd.as_ref();
    // Collect args into OsString once (required for Command::args)
    let args_os: Vec<OsString> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    let cmd_line = || {
        let args_str: Vec<String> = args_os
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        format!("{} {}", cmd_os.to_string_lossy(), args_str.join(" "))
    };

    let mut run = Command::new(cmd_os)
        .args(&args_os)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .wrap_err_with(|| format!("Failed to spawn {}", cmd_line()))?;

    let stdout = run.stdout.take().ok_or_eyre("Stdout handle present")?;
    let stderr = run.stderr.take().ok_or_eyre("Stderr handle present")?;

    // Drain both pipes concurrently so a chatty child cannot block on a full pipe
    let stdout_handle = tokio::task::spawn(capture_stream(stdout));
    let stderr_handle = tokio::task::spawn(capture_stream(stderr));

    let waited = tokio::time::timeout(timeout, run.wait()).await;
    let status = match waited {
        Ok(status) => status.wrap_err_with(|| format!("Failed to execute {}", cmd_line()))?,
        Err(_) => {
            run.start_kill().ok();
            return Err(eyre!(
                "{} did not finish within {}s",
                cmd_line(),
                timeout.as_secs_f32()
            ));
        }
    };
    let (stdout_result, stderr_result) = tokio::join!(stdout_handle, stderr_handle);

    Ok(Output {
        status,
        stdout: stdout_result.wrap_err("Stdout task panicked")?,
        stderr: stderr_result.wrap_err("Stderr task panicked")?,
    })
}

/// Reads an input stream to its end and returns everything read.
///
/// # Arguments
/// * `stream` - The input stream to read from (must implement AsyncRead + Unpin)
pub(crate) async fn capture_stream<R>(stream: R) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut reader = tokio::io::BufReader::new(stream);

    // Buffer for reading chunks of data (1KB chunks)
    let mut chunk = vec![0; 1024];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) => {
                tracing::warn!("Error reading stream: {}", e);
                break;
            }
        }
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exec_output() -> Result<()> {
        let output = exec_output("echo", ["-n", "success"], Duration::from_secs(5)).await?;
        assert!(output.status.success());
        assert_eq!(output.stdout, b"success");

        let output = exec_output("sh", ["-c", "echo oops >&2; exit 3"], Duration::from_secs(5))
            .await?;
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "oops");
        Ok(())
    }

    #[tokio::test]
    async fn test_exec_output_arguments_are_not_interpreted() -> Result<()> {
        let output = exec_output("echo", ["$(whoami);", "ls"], Duration::from_secs(5)).await?;
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "$(whoami); ls");
        Ok(())
    }

    #[tokio::test]
    async fn test_exec_output_timeout() {
        let result = exec_output("sleep", ["5"], Duration::from_millis(100)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_exec_output_missing_binary() {
        let result = exec_output(
            "modterm-no-such-binary",
            Vec::<&str>::new(),
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_err());
    }
}
