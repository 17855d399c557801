//! Utility functions.

use tracing::info;

/// Resolves when the process receives Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl-C handler: {}", e);
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Host to use when connecting to a listener bound on `addr`.
///
/// Unspecified addresses (`0.0.0.0`, `::`) are reachable through loopback.
pub fn connect_host(addr: std::net::SocketAddr) -> String {
    let ip = addr.ip();
    if ip.is_unspecified() {
        if ip.is_ipv4() {
            "127.0.0.1".to_string()
        } else {
            "[::1]".to_string()
        }
    } else if ip.is_ipv6() {
        format!("[{}]", ip)
    } else {
        ip.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_host_maps_unspecified_to_loopback() {
        assert_eq!(connect_host("0.0.0.0:8080".parse().unwrap()), "127.0.0.1");
        assert_eq!(connect_host("[::]:8080".parse().unwrap()), "[::1]");
    }

    #[test]
    fn connect_host_keeps_concrete_addresses() {
        assert_eq!(connect_host("10.1.2.3:80".parse().unwrap()), "10.1.2.3");
        assert_eq!(connect_host("[fe80::1]:80".parse().unwrap()), "[fe80::1]");
    }
}
