/// TCP accept loop
///
/// Accepts client connections and spawns one independent session task
/// per connection. Sessions share nothing but the registry.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::warn;

use crate::registry::Registry;
use crate::session::Session;

pub struct Server {
    registry: Arc<Registry>,
}

impl Server {
    /// Create a server rooted at the top-level database directory.
    pub fn new(root: impl Into<PathBuf>) -> Server {
        Server {
            registry: Arc::new(Registry::new(root)),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Serve connections forever on `listener`.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            if let Err(e) = stream.set_nodelay(true) {
                warn!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
            }
            let session = Session::new(self.registry.clone(), peer.to_string());
            tokio::spawn(session.run(stream));
        }
    }
}
