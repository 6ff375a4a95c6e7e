//! Process shutdown as a [`CancellationToken`] the server can select on.

use std::future::Future;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

/// Token cancelled on SIGINT/SIGTERM (Ctrl+C, Ctrl+Break or console close on
/// Windows).
pub fn signal_token() -> CancellationToken {
    cancel_when(async {
        if let Err(e) = termination_signal().await {
            tracing::warn!(error = %e, "signal handlers unavailable, waiting for ctrl_c");
            let _ = tokio::signal::ctrl_c().await;
        }
        tracing::info!("termination signal received");
    })
}

/// Token cancelled once `trigger` completes.
pub fn cancel_when<F>(trigger: F) -> CancellationToken
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    tokio::spawn(async move {
        trigger.await;
        drop(guard);
    });
    token
}

#[cfg(unix)]
async fn termination_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = term.recv() => {}
        _ = int.recv() => {}
    }
    Ok(())
}

#[cfg(windows)]
async fn termination_signal() -> Result<()> {
    use tokio::signal::windows::{ctrl_break, ctrl_c, ctrl_close};

    let (mut c, mut brk, mut close) = (ctrl_c()?, ctrl_break()?, ctrl_close()?);
    tokio::select! {
        _ = c.recv() => {}
        _ = brk.recv() => {}
        _ = close.recv() => {}
    }
    Ok(())
}
