//! TCP server that exposes a shared [`DataArea`](crate::data::DataArea)
//! to any number of concurrent Modbus clients.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

use crate::data::DataArea;
use crate::error::RequestError;

mod engine;
pub(crate) mod task;

pub use engine::process;

/// A handle to the server task. Dropping the handle shuts down the accept
/// loop and every active session.
#[derive(Debug)]
pub struct ServerHandle {
    _tx: tokio::sync::mpsc::Sender<()>,
}

/// Bind `addr` and spawn the accept loop onto the runtime.
///
/// Each incoming connection gets its own task; all sessions serve the same
/// data area.
pub async fn spawn_tcp_server_task(
    addr: SocketAddr,
    area: Arc<DataArea>,
) -> Result<ServerHandle, std::io::Error> {
    let listener = TcpListener::bind(addr).await?;

    let (tx, rx) = tokio::sync::mpsc::channel(1);
    tokio::spawn(
        ServerTask::new(listener, area)
            .run(rx)
            .instrument(tracing::info_span!("Modbus-Server-TCP", "listen" = ?addr)),
    );

    Ok(ServerHandle { _tx: tx })
}

struct ServerTask {
    listener: TcpListener,
    area: Arc<DataArea>,
    // dropped with the task, which ends every subscribed session
    session_tx: tokio::sync::broadcast::Sender<()>,
}

impl ServerTask {
    fn new(listener: TcpListener, area: Arc<DataArea>) -> Self {
        let (session_tx, _) = tokio::sync::broadcast::channel(1);
        Self {
            listener,
            area,
            session_tx,
        }
    }

    async fn run(self, mut shutdown: tokio::sync::mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("stopping the accept loop");
                    return;
                }
                result = self.listener.accept() => {
                    match result {
                        Err(err) => {
                            tracing::error!("accept failed: {}", err);
                            return;
                        }
                        Ok((socket, addr)) => {
                            self.handle(socket, addr);
                        }
                    }
                }
            }
        }
    }

    fn handle(&self, socket: TcpStream, addr: SocketAddr) {
        let area = self.area.clone();
        let shutdown = self.session_tx.subscribe();
        let span = tracing::span::Span::current();

        tracing::info!("new connection from {}", addr);

        tokio::spawn(
            async move {
                let mut session = task::SessionTask::new(socket, area, shutdown);
                match session.run().await {
                    Err(RequestError::Shutdown) => {
                        tracing::info!("session closed by server shutdown")
                    }
                    Err(RequestError::Io(kind)) => {
                        tracing::info!("session ended: {:?}", kind)
                    }
                    Err(err) => tracing::warn!("session ended: {}", err),
                    Ok(()) => {}
                }
            }
            .instrument(tracing::info_span!(parent: &span, "Session", "remote" = ?addr)),
        );
    }
}
