use axum::Router;
use std::net::{SocketAddr, TcpListener};
use tokio::net::TcpListener as TokioTcpListener;
use tokio::task::JoinHandle;

/// Serves `app` on an ephemeral localhost port.
pub async fn spawn_server(app: Router) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let std_listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = std_listener.local_addr()?;
    std_listener.set_nonblocking(true)?;
    let listener = TokioTcpListener::from_std(std_listener)?;

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });

    Ok((addr, handle))
}
