//! External sort bridge.
//!
//! With `--sort`, input is piped through a `sort` subprocess keyed on the
//! group columns so unsorted input still forms contiguous groups. The child
//! runs under `LC_ALL=C` with a stable sort so `first`/`last` see input
//! order within each group.

use std::io::{self, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use anyhow::{anyhow, bail, Context, Result};

use crate::config::{Config, Delimiter};
use crate::ops::parser::GroupColumn;

pub struct SortPipe {
    child: Child,
    relay: Option<JoinHandle<io::Result<u64>>>,
}

/// Argument vector for the sort subprocess.
fn sort_args(cfg: &Config, groups: &[GroupColumn]) -> Vec<String> {
    let mut args = Vec::new();
    if cfg.case_insensitive {
        args.push("-f".to_string());
    }
    // stable sort keeps non-key order, required for first/last
    args.push("-s".to_string());
    if let Delimiter::Byte(b) = cfg.delimiter {
        args.push("-t".to_string());
        args.push(String::from_utf8_lossy(&[b]).into_owned());
    }
    for grp in groups {
        args.push("-k".to_string());
        args.push(format!("{0},{0}", grp.num));
    }
    args
}

/// Spawn the sort subprocess and hand back its stdout for the engine to
/// consume. With `stream_stdin`, the header line has already been read off
/// our stdin, so the remaining bytes are relayed to the child from a
/// background thread; otherwise the child inherits stdin directly.
pub fn spawn(
    cfg: &Config,
    groups: &[GroupColumn],
    stream_stdin: bool,
) -> Result<(SortPipe, BufReader<ChildStdout>)> {
    let mut cmd = Command::new("sort");
    cmd.env("LC_ALL", "C");
    cmd.args(sort_args(cfg, groups));
    cmd.stdout(Stdio::piped());
    cmd.stdin(if stream_stdin {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            anyhow!("failed to run 'sort': command not found")
        } else {
            anyhow!("failed to run 'sort': {e}")
        }
    })?;

    let relay = if stream_stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("failed to open 'sort' stdin"))?;
        Some(std::thread::spawn(move || {
            let stdin = io::stdin();
            io::copy(&mut stdin.lock(), &mut child_stdin)
        }))
    } else {
        None
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("failed to open 'sort' stdout"))?;

    Ok((SortPipe { child, relay }, BufReader::new(stdout)))
}

impl SortPipe {
    /// Reap the subprocess and report its exit status.
    pub fn finish(mut self) -> Result<()> {
        if let Some(relay) = self.relay.take() {
            match relay.join() {
                Ok(copy_result) => {
                    copy_result.context("failed to stream input to 'sort'")?;
                }
                Err(_) => bail!("input relay thread panicked"),
            }
        }
        let status = self.child.wait().context("failed to wait for 'sort'")?;
        if !status.success() {
            bail!("'sort' process failed ({status})");
        }
        Ok(())
    }
}
