//! TCP control channel.
//!
//! Every connection gets its own [`Dispatcher`] (and therefore its own `error?`
//! slot) running on a blocking worker, so slow commands such as `acq:start`
//! never stall the accept loop. An exit keyword closes only that connection.

use crate::command::Dispatcher;
use crate::error::{AppResult, LockinError};
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

/// Builds a fresh dispatcher for each client.
pub type DispatcherFactory = Arc<dyn Fn() -> Dispatcher + Send + Sync>;

/// Line-oriented command server.
pub struct ControlServer {
    listener: TcpListener,
    factory: DispatcherFactory,
}

impl std::fmt::Debug for ControlServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlServer")
            .field("addr", &self.listener.local_addr().ok())
            .finish_non_exhaustive()
    }
}

impl ControlServer {
    /// Bind to `addr` (e.g. `127.0.0.1:5025`, port 0 for an ephemeral port).
    pub async fn bind(addr: &str, factory: DispatcherFactory) -> AppResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Control server listening");
        Ok(Self { listener, factory })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until the task is dropped.
    pub async fn run(self) -> AppResult<()> {
        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => {
                    let dispatcher = (self.factory)();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(socket, addr, dispatcher).await {
                            warn!(%addr, error = %e, "Client error");
                        }
                    });
                }
                Err(e) => error!(error = %e, "Accept error"),
            }
        }
    }
}

async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    mut dispatcher: Dispatcher,
) -> AppResult<()> {
    info!(%addr, "Client connected");
    let stream = socket.into_std()?;
    stream.set_nonblocking(false)?;

    tokio::task::spawn_blocking(move || -> AppResult<()> {
        let reader = BufReader::new(stream.try_clone()?);
        dispatcher.run(reader, &stream)
    })
    .await
    .map_err(|e| LockinError::Processing(format!("Client task failed: {e}")))??;

    info!(%addr, "Client disconnected");
    Ok(())
}
