//! Run command implementation.

use crate::client::ReqwestClient;
use dirsync_node::{HttpTransport, Node, NodeConfig, NodeError, SharedTransport};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Runs the node until it is interrupted or loses every server.
///
/// Losing every server exits the process with status 1 without waiting for
/// in-flight requests.
pub fn run(
    config_path: &Path,
    request_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = NodeConfig::from_json_file(config_path)?;

    // The blocking client owns its own runtime and must be built outside ours.
    let client = ReqwestClient::new(request_timeout)?;
    let node = Node::initialize(config, |address| {
        Arc::new(HttpTransport::new(address, client.clone())) as SharedTransport
    })?;
    info!(identity = %node.identity(), "node identity acquired");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        tokio::select! {
            result = node.run_update_loop() => result,
            Ok(()) = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                node.stop();
                node.join_heartbeat().await
            }
        }
    });

    match result {
        Ok(()) => Ok(()),
        Err(NodeError::NoServersOnline) => {
            error!("no servers online, exiting");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
