use tokio::signal;

/// Resolves on Ctrl+C or SIGTERM. The HTTP server drains in-flight requests after this; the
/// worker stops its poller, which hands any in-flight submission back to INITIALIZED.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = ctrl_c => "interrupt",
        _ = terminate => "terminate",
    };

    tracing::info!(signal = received, "Shutdown signal received");
}
