//! TCP Server
//!
//! Accepts connections and hands each to a front end on its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::sync::WaitGroup;

use crate::config::Config;
use crate::error::{HurmaError, Result};

use super::{is_disconnect_error, Connection, TerminationLatch};

/// A wire protocol served over accepted connections
///
/// Implementations own no storage state of their own; they translate
/// requests into engine calls and hold only per-connection buffers.
pub trait FrontEnd: Send + Sync + 'static {
    /// Protocol name for logs
    fn name(&self) -> &'static str;

    /// Serve one connection until the client leaves
    fn serve(&self, conn: &mut Connection) -> Result<()>;
}

/// Decrements the live-connection count when a connection thread ends
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// TCP server for HurmaDB, generic over the protocol it speaks
pub struct Server<F: FrontEnd> {
    config: Config,
    listener: TcpListener,
    front_end: Arc<F>,
    latch: TerminationLatch,
    active: Arc<AtomicUsize>,
}

impl<F: FrontEnd> Server<F> {
    /// Bind `config.listen_addr`
    ///
    /// The listener is non-blocking so the accept loop can notice the
    /// termination latch without waiting for another client.
    pub fn bind(config: Config, front_end: F, latch: TerminationLatch) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            HurmaError::Config(format!("cannot listen on {}: {}", config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;

        tracing::info!(
            "{} front end listening on {}",
            front_end.name(),
            listener.local_addr()?
        );

        Ok(Self {
            config,
            listener,
            front_end: Arc::new(front_end),
            latch,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until the latch trips, then wait for accepted connections
    ///
    /// The latch is checked once per iteration; while no client is pending
    /// the loop sleeps on the latch for at most `accept_poll_interval_ms`.
    pub fn run(self) -> Result<()> {
        let poll = Duration::from_millis(self.config.accept_poll_interval_ms.max(1));
        let in_flight = WaitGroup::new();

        while !self.latch.is_terminated() {
            match self.listener.accept() {
                Ok((stream, addr)) => self.dispatch(stream, addr, &in_flight),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.latch.wait_timeout(poll);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    // e.g. out of file descriptors; back off and retry
                    tracing::warn!("accept failed: {}", e);
                    self.latch.wait_timeout(poll);
                }
            }
        }

        let Server {
            listener, active, ..
        } = self;
        drop(listener);

        tracing::info!(
            "Termination requested, waiting for {} in-flight connections",
            active.load(Ordering::SeqCst)
        );
        in_flight.wait();
        tracing::info!("All connections finished");
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, addr: SocketAddr, in_flight: &WaitGroup) {
        if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
            tracing::warn!(
                "Rejecting {}: {} connections already open",
                addr,
                self.config.max_connections
            );
            return;
        }

        let mut conn = match Connection::new(stream).and_then(|mut c| {
            c.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms)?;
            Ok(c)
        }) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to set up connection from {}: {}", addr, e);
                return;
            }
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active));
        let front_end = Arc::clone(&self.front_end);
        let wg = in_flight.clone();

        let spawned = thread::Builder::new()
            .name(format!("conn-{}", addr))
            .spawn(move || {
                let _guard = guard;
                let _wg = wg;
                // Declared after `_wg` so the engine handle is gone before the
                // wait group lets `run` return
                let front_end = front_end;
                tracing::debug!("Connection established from {}", conn.peer_addr());
                match front_end.serve(&mut conn) {
                    Ok(()) => tracing::debug!("Client {} disconnected", conn.peer_addr()),
                    Err(e) if is_disconnect_error(&e) => {
                        tracing::debug!("Client {} went away: {}", conn.peer_addr(), e)
                    }
                    Err(e) => tracing::warn!("Connection {} failed: {}", conn.peer_addr(), e),
                }
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn connection thread for {}: {}", addr, e);
        }
    }
}
