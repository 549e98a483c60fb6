//! Drives the real `surfsense` executable

#![cfg(unix)]

use std::net::TcpListener;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

struct Running {
    child: Child,
    output: JoinHandle<String>,
    port: u16,
    _spool: TempDir,
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn start(args: &[&str], port: u16) -> Running {
    let spool = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_surfsense"))
        .args(args)
        .env("SERVER_HOST", "127.0.0.1")
        .env("SERVER_PORT", port.to_string())
        .env("SERVER_SHUTDOWN_GRACE_SECS", "5")
        .env("TASK_SPOOL_DIR", spool.path())
        .env("WORKER_POLL_INTERVAL_MS", "50")
        .env("LOG_FORMAT", "text")
        .env("RUST_LOG", "info")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let mut stdout = child.stdout.take().unwrap();
    let mut stderr = child.stderr.take().unwrap();
    let output = tokio::spawn(async move {
        let mut out = String::new();
        let mut err = String::new();
        let _ = tokio::join!(stdout.read_to_string(&mut out), stderr.read_to_string(&mut err));
        out + &err
    });

    Running {
        child,
        output,
        port,
        _spool: spool,
    }
}

impl Running {
    async fn wait_until_healthy(&self) {
        let url = format!("http://127.0.0.1:{}/health", self.port);
        for _ in 0..150 {
            if let Ok(response) = reqwest::get(&url).await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("server never became healthy on port {}", self.port);
    }

    fn signal(&self, signal: Signal) {
        let pid = self.child.id().unwrap() as i32;
        kill(Pid::from_raw(pid), signal).unwrap();
    }

    async fn finish(mut self) -> (ExitStatus, String) {
        let status = tokio::time::timeout(Duration::from_secs(30), self.child.wait())
            .await
            .expect("surfsense did not exit")
            .unwrap();
        let output = tokio::time::timeout(Duration::from_secs(30), self.output)
            .await
            .expect("output never closed")
            .unwrap();
        (status, output)
    }
}

/// Lines logging exactly `message`, not messages that merely start with it.
fn lines_with<'a>(output: &'a str, message: &str) -> Vec<&'a str> {
    let with_fields = format!("{message} ");
    output
        .lines()
        .filter(|line| line.contains(&with_fields) || line.ends_with(message))
        .collect()
}

#[tokio::test]
async fn test_standalone_server_exits_cleanly_on_sigint() {
    let running = start(&["--no-celery"], free_port());
    running.wait_until_healthy().await;
    running.signal(Signal::SIGINT);

    let (status, output) = running.finish().await;

    assert_eq!(status.code(), Some(0), "{output}");
    assert!(lines_with(&output, "started child process").is_empty(), "{output}");
    assert!(lines_with(&output, "stopping child process").is_empty(), "{output}");
    assert!(lines_with(&output, "cleaning up children").is_empty(), "{output}");
    assert!(output.contains("shutdown complete"), "{output}");
}

#[tokio::test]
async fn test_sigterm_stops_worker_then_scheduler() {
    let running = start(&[], free_port());
    running.wait_until_healthy().await;
    running.signal(Signal::SIGTERM);

    let (status, output) = running.finish().await;
    assert_eq!(status.code(), Some(0), "{output}");

    let started = lines_with(&output, "started child process");
    assert_eq!(started.len(), 2, "{output}");
    assert!(started[0].contains("role=worker"), "{output}");
    assert!(started[1].contains("role=scheduler"), "{output}");

    let stopping = lines_with(&output, "stopping child process");
    assert_eq!(stopping.len(), 2, "{output}");
    assert!(stopping[0].contains("role=worker"), "{output}");
    assert!(stopping[1].contains("role=scheduler"), "{output}");

    let last = output
        .lines()
        .rfind(|line| line.contains("surfsense_supervisor"))
        .unwrap_or_default();
    assert!(last.contains("shutdown complete"), "{output}");
}

#[tokio::test]
async fn test_no_beat_starts_only_worker() {
    let running = start(&["--no-beat"], free_port());
    running.wait_until_healthy().await;
    running.signal(Signal::SIGTERM);

    let (status, output) = running.finish().await;

    assert_eq!(status.code(), Some(0), "{output}");
    assert_eq!(lines_with(&output, "cleaning up children").len(), 1, "{output}");
    let stopping = lines_with(&output, "stopping child process");
    assert_eq!(stopping.len(), 1, "{output}");
    assert!(stopping[0].contains("role=worker"), "{output}");
}

#[tokio::test]
async fn test_port_in_use_fails_after_stopping_children() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let running = start(&[], port);
    let (status, output) = running.finish().await;
    drop(taken);

    assert_ne!(status.code(), Some(0), "{output}");
    assert!(output.contains("HTTP server failed"), "{output}");
    assert_eq!(lines_with(&output, "started child process").len(), 2, "{output}");
    assert_eq!(lines_with(&output, "cleaning up children").len(), 1, "{output}");
    let stopping = lines_with(&output, "stopping child process");
    assert_eq!(stopping.len(), 2, "{output}");
    assert!(stopping[0].contains("role=worker"), "{output}");
    assert!(output.contains("shutdown complete"), "{output}");
}
