use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::encoder::{encode_request, MODE_DECLARATION};
use crate::model::{Config, WorkerOutcome, WorkerReport};

/// Opens one connection to the first of `addrs` that accepts, declares the
/// bitwise dialect and writes `config.requests_per_worker` freshly encoded
/// requests.
///
/// Never reads from the socket. Every failure is folded into the returned
/// report so that siblings are unaffected.
pub async fn worker(
    rank: usize,
    config: Arc<Config>,
    addrs: Arc<[SocketAddr]>,
    token: CancellationToken,
) -> WorkerReport {
    let intended = config.requests_per_worker;

    let stream = tokio::select! {
        biased;
        _ = token.cancelled() => {
            return WorkerReport::not_started(rank, intended, WorkerOutcome::Cancelled);
        }
        stream = connect(&addrs, &config) => stream,
    };
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            warn!(rank, addrs = ?addrs, error = %e, "worker failed to connect");
            return WorkerReport::not_started(
                rank,
                intended,
                WorkerOutcome::ConnectionFailed(e.to_string()),
            );
        }
    };

    let mut rng = SmallRng::from_rng(&mut rand::rng());
    let mut sent = 0;

    let begin = Utc::now();
    let start = Instant::now();
    let result = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = send_all(&mut stream, &config, &mut rng, &mut sent) => Some(result),
    };
    let elapsed = start.elapsed();
    let end = Utc::now();

    if let Err(e) = stream.shutdown().await {
        debug!(rank, error = %e, "failed to close connection");
    }

    let outcome = match result {
        Some(Ok(())) => {
            debug!(rank, sent, elapsed = ?elapsed, "worker finished");
            WorkerOutcome::Completed
        }
        Some(Err(e)) => {
            warn!(rank, sent, intended, error = %e, "write failed, dropping connection");
            WorkerOutcome::PartialSend(e.to_string())
        }
        None => {
            debug!(rank, sent, intended, "worker cancelled");
            WorkerOutcome::Cancelled
        }
    };

    WorkerReport {
        rank,
        intended,
        sent,
        begin,
        end,
        elapsed,
        outcome,
    }
}

async fn connect(addrs: &[SocketAddr], config: &Config) -> io::Result<TcpStream> {
    let stream = match config.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, connect_any(addrs))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {limit:?}"),
                )
            })??,
        None => connect_any(addrs).await?,
    };
    if config.nodelay {
        stream.set_nodelay(true)?;
    }
    Ok(stream)
}

/// Tries each address in turn and returns the first connection, or the last
/// error if none accepts.
async fn connect_any(addrs: &[SocketAddr]) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "no address to connect to")
    }))
}

/// Writes the mode declaration followed by the request quota, counting each
/// request whose write completed in `sent`.
async fn send_all(
    stream: &mut TcpStream,
    config: &Config,
    rng: &mut SmallRng,
    sent: &mut u64,
) -> io::Result<()> {
    stream.write_all(MODE_DECLARATION.as_bytes()).await?;
    for _ in 0..config.requests_per_worker {
        let request = encode_request(rng, &config.encoder);
        stream.write_all(request.as_bytes()).await?;
        *sent += 1;
    }
    stream.flush().await
}
