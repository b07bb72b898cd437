//! Proxy server accept loop
//!
//! Binds the listening socket and spawns one task per accepted client
//! connection. Session failures are logged and contained; only listener
//! setup errors propagate out.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::cache::WireCache;
use crate::config::Config;
use crate::error::Result;
use crate::proxy::session::{Session, SessionContext};
use crate::services::access_log::AccessLog;

/// Accepts client connections and dispatches sessions.
pub struct ProxyServer {
    listener: TcpListener,
    ctx: Arc<SessionContext>,
}

impl ProxyServer {
    /// Bind the listener. A bind/listen failure here is fatal to the
    /// process, so it surfaces as an error instead of being logged away.
    pub async fn bind(
        config: &Config,
        cache: Arc<WireCache>,
        access_log: AccessLog,
    ) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        info!("proxy listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            ctx: Arc::new(SessionContext {
                cache,
                access_log,
                settings: config.session,
            }),
        })
    }

    /// The bound address, useful when the configured port was 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until shutdown. Each connection immediately gets its own
    /// task, so a slow session never stalls the accept loop.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            let session = Session::new(stream, peer, Arc::clone(&self.ctx));
                            tokio::spawn(async move {
                                if let Err(e) = session.run().await {
                                    debug!(%peer, "session ended with error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("proxy server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}
