//! Datagram channel to the co-located peer process.
//!
//! Messages are addressed by a path made of the node identity and any number
//! of `:` separated segments:
//!
//! ```text
//! node.path("a").path("b").send("x")   ->  "<node>:a:b:x"
//! node.send("y")                       ->  "<node>y"
//! ```
//!
//! Delivery is best effort. Nothing is acknowledged or retried.

use crate::env::NodeEnvironment;
use log::{debug, trace};
use std::fs::File;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::path::{Path, PathBuf};

/// Where the peer process listens.
pub const PEER_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4444));

const SCRATCH_TMP_PREFIX: &str = "scratch-cached-tmp";

#[derive(Debug)]
pub struct Node {
    node: String,
    scratch: PathBuf,
    socket: UdpSocket,
    target: SocketAddr,
}

impl Node {
    pub fn new(node: impl Into<String>, scratch: impl Into<PathBuf>) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
        Ok(Self { node: node.into(), scratch: scratch.into(), socket, target: PEER_ADDR })
    }

    pub fn from_env(env: &NodeEnvironment) -> io::Result<Self> {
        Self::new(env.node.clone(), env.scratch.clone())
    }

    /// Send to a different endpoint than [`PEER_ADDR`].
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    pub fn id(&self) -> &str {
        &self.node
    }

    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// Transmit `raw` as a single datagram, unchanged.
    pub fn send_raw(&self, raw: &str) -> io::Result<()> {
        debug!("sending {:?}", raw);
        self.socket.send_to(raw.as_bytes(), self.target)?;
        Ok(())
    }

    /// Send to the node's root path. There is no separator between the node
    /// identity and `data`.
    pub fn send(&self, data: &str) -> io::Result<()> {
        self.send_raw(&format!("{}{}", self.node, data))
    }

    /// Address the child `segment` below the node.
    pub fn path(&self, segment: &str) -> Sender<'_> {
        Sender { node: self, path: format!("{}:{}", self.node, segment) }
    }

    /// See [`scratch_cached`]; the link is created in the working directory.
    pub fn scratch_cached<F, E>(&self, filename: &str, generator: F) -> Result<PathBuf, E>
    where
        F: FnOnce(&mut File) -> Result<(), E>,
        E: From<io::Error>,
    {
        scratch_cached(&self.scratch, Path::new("."), filename, generator)
    }
}

/// A path below a [`Node`], ready to send to.
#[derive(Debug, Clone)]
pub struct Sender<'a> {
    node: &'a Node,
    path: String,
}

impl<'a> Sender<'a> {
    pub fn path(&self, segment: &str) -> Sender<'a> {
        Sender { node: self.node, path: format!("{}:{}", self.path, segment) }
    }

    pub fn address(&self) -> &str {
        &self.path
    }

    pub fn send(&self, data: &str) -> io::Result<()> {
        self.node.send_raw(&format!("{}:{}", self.path, data))
    }
}

/// Materialize `filename` in the shared `scratch` directory and link it into
/// `link_dir`.
///
/// The generator only runs when the cached file does not exist yet. It writes
/// into a temporary file inside `scratch` that is renamed into place once it
/// succeeded, so no caller ever sees a partially written cache entry. If the
/// generator fails the temporary file is discarded and the error returned.
/// The link is re-pointed at the cached file on every call.
pub fn scratch_cached<F, E>(scratch: &Path, link_dir: &Path, filename: &str, generator: F) -> Result<PathBuf, E>
where
    F: FnOnce(&mut File) -> Result<(), E>,
    E: From<io::Error>,
{
    let cached = scratch.join(filename);

    if !cached.exists() {
        debug!("generating scratch cached file {}", cached.display());
        let mut tmp = tempfile::Builder::new().prefix(SCRATCH_TMP_PREFIX).tempfile_in(scratch)?;
        generator(tmp.as_file_mut())?;
        tmp.persist(&cached).map_err(io::Error::from)?;
    } else {
        trace!("using scratch cached file {}", cached.display());
    }

    let link = link_dir.join(filename);
    if link.symlink_metadata().is_ok() {
        let _ = std::fs::remove_file(&link);
    }
    symlink(&cached, &link)?;
    Ok(cached)
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}
