use std::future::{self, Future};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use crate::codec::EncodeError;
use crate::commands::{self, CommandError};
use crate::config::Config;
use crate::connection::{Connection, ConnectionError};
use crate::frame::Frame;
use crate::Result;

/// Binds the configured address and serves until Ctrl-C.
pub async fn run(config: Config) -> Result<()> {
    let listener = TcpListener::bind(config.addr()).await?;

    serve(listener, config, async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for the shutdown signal: {}", e);
            future::pending::<()>().await;
        }
    })
    .await
}

/// Accepts connections on `listener` until `shutdown` resolves. Each connection is handled by its
/// own task; tasks share nothing but the read-only config.
pub async fn serve(
    listener: TcpListener,
    config: Config,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let config = Arc::new(config);
    tokio::pin!(shutdown);

    info!("Redis server listening on {}", listener.local_addr()?);

    loop {
        let (socket, client_address) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut shutdown => {
                info!("Shutting down");
                return Ok(());
            }
        };
        let config = config.clone();
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, client_address, config).await {
                error!("Connection failed: {}", e);
            }
        });
    }
}

#[instrument(
    name = "connection",
    skip(stream, config),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    config: Arc<Config>,
) -> Result<()> {
    let mut conn = Connection::new(stream, client_address, &config);

    tracing::Span::current()
        .record("connection_id", conn.id.to_string())
        .record("client_address", client_address.to_string());

    serve_connection(&mut conn, &config, commands::dispatch).await
}

/// Runs the read, dispatch and write loop until the client goes away. `dispatch` turns each
/// request frame into an optional response.
async fn serve_connection<R, W, D>(
    conn: &mut Connection<R, W>,
    config: &Config,
    dispatch: D,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    D: Fn(Frame) -> std::result::Result<Option<Frame>, CommandError>,
{
    let mut read_errors = 0;

    loop {
        let read = match config.idle_timeout {
            Some(limit) => match timeout(limit, conn.read_frame()).await {
                Ok(read) => read,
                Err(_) => {
                    info!("Closing idle connection after {:?}", limit);
                    break;
                }
            },
            None => conn.read_frame().await,
        };

        let frame = match read {
            Ok(Some(frame)) => {
                read_errors = 0;
                frame
            }
            Ok(None) => break,
            Err(ConnectionError::Decode(e)) => {
                read_errors = 0;
                error!("Error while decoding message: {}", e);
                continue;
            }
            Err(ConnectionError::Io(e)) => {
                read_errors += 1;
                error!("Error while reading message ({}): {}", read_errors, e);
                if read_errors >= config.max_read_errors {
                    warn!("Too many consecutive read errors, closing connection");
                    break;
                }
                continue;
            }
        };

        info!("Received frame from client: {}", frame);

        let res = match dispatch(frame) {
            Ok(Some(res)) => res,
            Ok(None) => continue,
            Err(e) => {
                if e.is_interpretation() {
                    error!("Error while interpreting message: {}", e);
                } else {
                    error!("Error while executing command: {}", e);
                }

                if !config.error_replies {
                    continue;
                }
                e.reply()
            }
        };

        info!("Sending response to client: {}", res);

        match conn.write_frame(res).await {
            Ok(()) => {}
            Err(e @ (EncodeError::Unsupported { .. } | EncodeError::InvalidLine { .. })) => {
                error!("Dropping response: {}", e)
            }
            Err(e @ EncodeError::Io(_)) => return Err(e.into()),
        }
    }

    info!("Connection closed");
    Ok(())
}
