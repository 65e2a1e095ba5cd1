//! Identity command implementation.

use dirsync_node::NodeIdentity;
use std::path::Path;

/// Prints the identity stored at `path`, generating it on first use.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let identity = NodeIdentity::acquire(path)?;
    println!("{}", identity);
    Ok(())
}
