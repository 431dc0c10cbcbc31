#![allow(dead_code)]

use echo_service::PROTO_DIR;
use protodial_core::catalog::ProtoCatalog;
use protodial_core::resolver::resolve;
use protodial_core::session::OutputSink;
use protodial_core::tokio_util::sync::CancellationToken;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::Routes;
use tonic::transport::Server;

pub fn proto_dir(sub: &str) -> PathBuf {
    Path::new(PROTO_DIR).join(sub)
}

pub fn echo_catalog() -> ProtoCatalog {
    let set = resolve(&proto_dir("echo"), None).expect("Failed to resolve echo protos");
    ProtoCatalog::new(set)
}

pub fn counter_catalog() -> ProtoCatalog {
    let set = resolve(&proto_dir("counter"), Some(Path::new(PROTO_DIR)))
        .expect("Failed to resolve counter protos");
    ProtoCatalog::new(set)
}

/// Serves `routes` on an ephemeral local port and returns `host:port`.
pub async fn serve_tcp(routes: Routes) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_routes(routes)
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    addr.to_string()
}

/// Collects blocks and cancels `cancel` once `limit` blocks arrived.
pub struct CancelAfter {
    pub blocks: Vec<String>,
    pub limit: usize,
    pub cancel: CancellationToken,
}

impl OutputSink for CancelAfter {
    fn reset(&mut self) {
        self.blocks.clear();
    }

    fn append(&mut self, block: String) {
        self.blocks.push(block);
        if self.blocks.len() == self.limit {
            self.cancel.cancel();
        }
    }
}

/// Parses a rendered block back into JSON.
pub fn json(block: &str) -> serde_json::Value {
    serde_json::from_str(block).expect("Rendered block is not JSON")
}
