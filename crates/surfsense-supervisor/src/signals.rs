//! Turning interrupt and termination signals into a shutdown request

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

use crate::error::SupervisorError;

/// Cancel `shutdown` on the first SIGINT or SIGTERM.
///
/// Handlers are registered before this returns. The returned task runs in
/// the caller's span and ends once the token is cancelled, whoever cancelled
/// it.
#[cfg(unix)]
pub fn install(shutdown: CancellationToken) -> Result<JoinHandle<()>, SupervisorError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).map_err(SupervisorError::Signals)?;
    let mut terminate = signal(SignalKind::terminate()).map_err(SupervisorError::Signals)?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = shutdown.cancelled() => return,
        };
        info!(signal = name, "shutdown requested");
        shutdown.cancel();
    }
    .in_current_span()))
}

#[cfg(not(unix))]
pub fn install(shutdown: CancellationToken) -> Result<JoinHandle<()>, SupervisorError> {
    Ok(tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "failed to listen for Ctrl+C");
                    return;
                }
            }
            _ = shutdown.cancelled() => return,
        }
        info!(signal = "ctrl-c", "shutdown requested");
        shutdown.cancel();
    }
    .in_current_span()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tracing::info_span;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_signal_is_logged_in_caller_span() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let token = CancellationToken::new();
        let handle = {
            let _span = info_span!("child", role = "worker").entered();
            install(token.clone()).unwrap()
        };

        nix::sys::signal::raise(nix::sys::signal::Signal::SIGINT).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(token.is_cancelled());

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|line| line.contains("shutdown requested"))
            .unwrap();
        assert!(line.contains("child{role=\"worker\"}"), "{line}");
    }

    #[tokio::test]
    async fn test_task_ends_when_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let handle = install(token.clone()).unwrap();

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
