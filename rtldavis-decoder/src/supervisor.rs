//! Receiver process supervision
//!
//! [`ProcessSupervisor`] owns the external receiver process. Each of its
//! output streams is read by a dedicated thread that pushes every line onto
//! an unbounded channel; the control loop pulls from those channels with a
//! bounded wait and never blocks the readers.

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use sysinfo::{Process, ProcessStatus, ProcessesToUpdate, System};

use crate::types::{DecoderError, Result};

/// Longest process name the kernel keeps (`/proc/<pid>/comm`)
const MAX_PROCESS_NAME: usize = 15;

/// How to launch the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub program: String,
    pub args: Vec<String>,
    /// Prepended to PATH
    pub path: Option<PathBuf>,
    /// Replaces LD_LIBRARY_PATH
    pub ld_library_path: Option<PathBuf>,
}

impl LaunchOptions {
    /// Split a whitespace separated command line into program and arguments
    pub fn from_command_line(
        command_line: &str,
        path: Option<PathBuf>,
        ld_library_path: Option<PathBuf>,
    ) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| DecoderError::Config("empty receiver command".into()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            path,
            ld_library_path,
        })
    }

    /// Executable name the running process shows up under
    pub fn process_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .unwrap_or_else(|| OsStr::new(&self.program))
            .to_string_lossy()
            .into_owned()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(path) = &self.path {
            let mut joined = path.as_os_str().to_os_string();
            if let Some(current) = std::env::var_os("PATH") {
                joined.push(":");
                joined.push(current);
            }
            command.env("PATH", joined);
        }
        if let Some(ld_library_path) = &self.ld_library_path {
            command.env("LD_LIBRARY_PATH", ld_library_path);
        }
        command
    }
}

/// True if a process listed as `listed` runs the executable `name`
///
/// The kernel may report only the first 15 bytes of the name.
fn name_matches(listed: &OsStr, name: &str) -> bool {
    let listed = listed.to_string_lossy();
    if listed == name {
        return true;
    }
    name.len() > MAX_PROCESS_NAME
        && listed.len() == MAX_PROCESS_NAME
        && name.as_bytes().starts_with(listed.as_bytes())
}

fn live_instances<'a>(system: &'a System, name: &'a str) -> impl Iterator<Item = &'a Process> + 'a {
    system
        .processes()
        .values()
        .filter(move |p| name_matches(p.name(), name))
        .filter(|p| p.status() != ProcessStatus::Zombie)
}

/// Pids of live processes named `name`
pub fn find_instances(name: &str) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    let mut pids: Vec<u32> = live_instances(&system, name)
        .map(|p| p.pid().as_u32())
        .collect();
    pids.sort_unstable();
    pids
}

/// Kill every live process named `name`, returning how many were signalled
pub fn kill_instances(name: &str) -> usize {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    let mut killed = 0;
    for process in live_instances(&system, name) {
        if process.kill() {
            log::info!("{} with pid {} killed", name, process.pid());
            killed += 1;
        } else {
            log::warn!("failed to kill {} with pid {}", name, process.pid());
        }
    }
    killed
}

/// A thread copying one output stream into a channel
struct StreamReader {
    label: &'static str,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(
        label: &'static str,
        stream: R,
        tx: Sender<String>,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(format!("{}-thread", label))
            .spawn(move || {
                log::debug!("start async reader for {}", label);
                let mut reader = BufReader::new(stream);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf).into_owned();
                            if tx.send(line).is_err() {
                                break;
                            }
                            // only checked between reads, a blocked read finishes first
                            if !flag.load(Ordering::Acquire) {
                                break;
                            }
                        }
                        Err(e) => {
                            log::warn!("{} reader error: {}", label, e);
                            break;
                        }
                    }
                }
                log::debug!("async reader for {} finished", label);
            })?;

        Ok(Self {
            label,
            running,
            handle: Some(handle),
        })
    }

    fn stop_running(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                log::debug!("{} reader still blocked, detaching", self.label);
            }
        }
    }
}

/// Kill `child` and wait for it to exit
fn reap(child: &mut Child, name: &str) {
    if let Err(e) = child.kill() {
        log::debug!("kill {}: {}", name, e);
    }
    if let Err(e) = child.wait() {
        log::warn!("failed to reap {}: {}", name, e);
    }
}

/// Owns one receiver process and its two stream readers
pub struct ProcessSupervisor {
    options: LaunchOptions,
    process_name: String,
    child: Option<Child>,
    stderr_rx: Receiver<String>,
    stdout_rx: Receiver<String>,
    readers: Vec<StreamReader>,
    stderr_closed: bool,
}

impl ProcessSupervisor {
    /// Kill stray instances of the receiver, then launch a fresh one
    pub fn startup(options: LaunchOptions) -> Result<Self> {
        let process_name = options.process_name();
        kill_instances(&process_name);

        log::info!(
            "startup process '{} {}'",
            options.program,
            options.args.join(" ")
        );
        let mut child = options
            .command()
            .spawn()
            .map_err(|e| DecoderError::Spawn(format!("{}: {}", options.program, e)))?;
        log::info!("{} started with pid {}", process_name, child.id());

        let (stderr_tx, stderr_rx) = flume::unbounded();
        let (stdout_tx, stdout_rx) = flume::unbounded();
        let readers = match Self::spawn_readers(&mut child, stderr_tx, stdout_tx) {
            Ok(readers) => readers,
            Err(e) => {
                log::error!("failed to start readers for {}: {}", process_name, e);
                reap(&mut child, &process_name);
                return Err(e);
            }
        };

        Ok(Self {
            options,
            process_name,
            child: Some(child),
            stderr_rx,
            stdout_rx,
            readers,
            stderr_closed: false,
        })
    }

    fn spawn_readers(
        child: &mut Child,
        stderr_tx: Sender<String>,
        stdout_tx: Sender<String>,
    ) -> Result<Vec<StreamReader>> {
        let mut readers = Vec::with_capacity(2);
        if let Some(stderr) = child.stderr.take() {
            readers.push(StreamReader::spawn("stderr", stderr, stderr_tx)?);
        }
        if let Some(stdout) = child.stdout.take() {
            readers.push(StreamReader::spawn("stdout", stdout, stdout_tx)?);
        }
        Ok(readers)
    }

    /// True while the receiver process has not exited
    pub fn running(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                log::debug!("{} exited with {}", self.process_name, status);
                false
            }
            Some(Err(e)) => {
                log::warn!("failed to poll {}: {}", self.process_name, e);
                false
            }
            None => false,
        }
    }

    /// True once the stderr stream has closed and been fully drained
    pub fn stderr_closed(&self) -> bool {
        self.stderr_closed
    }

    /// Wait up to `timeout` for stderr output, then take everything queued
    ///
    /// Returns an empty batch on timeout.
    pub fn drain_stderr(&mut self, timeout: Duration) -> Vec<String> {
        let mut lines = Vec::new();
        match self.stderr_rx.recv_timeout(timeout) {
            Ok(line) => lines.push(line),
            Err(RecvTimeoutError::Timeout) => return lines,
            Err(RecvTimeoutError::Disconnected) => {
                self.stderr_closed = true;
                return lines;
            }
        }
        lines.extend(self.stderr_rx.try_iter());
        lines
    }

    /// Take whatever stdout output is queued, without waiting
    pub fn drain_stdout(&mut self) -> Vec<String> {
        self.stdout_rx.try_iter().collect()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Stop the readers and kill the receiver; safe to call more than once
    pub fn shutdown(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        log::info!(
            "shutdown process {} {}",
            self.options.program,
            self.options.args.join(" ")
        );

        for reader in &mut self.readers {
            reader.stop_running();
        }

        reap(&mut child, &self.process_name);
        kill_instances(&self.process_name);
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_options_from_command_line() {
        let options = LaunchOptions::from_command_line(
            "/home/pi/work/bin/rtldavis  -ppm 2 -tf EU -tr 1",
            Some(PathBuf::from("/opt/bin")),
            None,
        )
        .unwrap();
        assert_eq!(options.program, "/home/pi/work/bin/rtldavis");
        assert_eq!(options.args, vec!["-ppm", "2", "-tf", "EU", "-tr", "1"]);
        assert_eq!(options.process_name(), "rtldavis");

        assert!(LaunchOptions::from_command_line("   ", None, None).is_err());
    }

    #[test]
    fn test_truncated_process_names_match() {
        let options = LaunchOptions::from_command_line("rtldavis-receiver-debug", None, None).unwrap();
        let name = options.process_name();
        assert_eq!(name, "rtldavis-receiver-debug");
        assert!(name_matches(OsStr::new("rtldavis-receiver-debug"), &name));
        assert!(name_matches(OsStr::new("rtldavis-receiv"), &name));
        assert!(!name_matches(OsStr::new("rtldavis-rec"), &name));
        assert!(!name_matches(OsStr::new("rtldavis"), "rtldavis-x"));
    }

    #[test]
    fn test_spawn_failure() {
        let options =
            LaunchOptions::from_command_line("/nonexistent/rtldavis-test-missing", None, None).unwrap();
        let err = ProcessSupervisor::startup(options).err().unwrap();
        assert!(matches!(err, DecoderError::Spawn(_)));
        assert!(err.is_fatal());
    }

    #[cfg(unix)]
    #[test]
    fn test_reap_leaves_no_child_behind() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        reap(&mut child, "sleep");
        // already reaped: try_wait reports the stored exit status
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn test_find_instances_of_missing_name() {
        assert!(find_instances("no-such-proc-x").is_empty());
        assert_eq!(kill_instances("no-such-proc-x"), 0);
    }
}
