use crate::env::{self, DEFAULT_SYNCER_SOCKET};
use interprocess::local_socket::prelude::LocalSocketStream;
use interprocess::local_socket::traits::Stream as _;
use interprocess::local_socket::{GenericFilePath, ToFsName};
use log::{debug, warn};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Opens the stream to the device daemon.
pub trait Connector: Send {
    fn connect(&mut self, path: &Path) -> io::Result<Box<dyn Write + Send>>;
}

/// Connects through a local socket at a filesystem path.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSocketConnector;

impl Connector for LocalSocketConnector {
    fn connect(&mut self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        let name = path.to_fs_name::<GenericFilePath>()?;
        let stream = LocalSocketStream::connect(name)?;
        Ok(Box::new(stream))
    }
}

/// Line based command channel to the device daemon.
///
/// The connection is opened lazily and dropped on the first I/O error; the
/// next send connects again. Nothing is ever reported back to the caller,
/// failures only show up in the log.
pub struct Device {
    socket_path: PathBuf,
    connector: Box<dyn Connector>,
    connection: Option<Box<dyn Write + Send>>,
}

impl Device {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::with_connector(socket_path, LocalSocketConnector)
    }

    pub fn with_connector(socket_path: impl Into<PathBuf>, connector: impl Connector + 'static) -> Self {
        Self { socket_path: socket_path.into(), connector: Box::new(connector), connection: None }
    }

    /// Use `SYNCER_SOCKET`, falling back to the default daemon socket.
    pub fn from_env() -> Self {
        Self::new(env::syncer_socket_from(&|key: &str| std::env::var(key).ok()))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect unless already connected. Makes at most one attempt.
    pub fn ensure_connected(&mut self) -> bool {
        if self.connection.is_some() {
            return true;
        }
        debug!("establishing upstream connection to {}", self.socket_path.display());
        match self.connector.connect(&self.socket_path) {
            Ok(connection) => {
                self.connection = Some(connection);
                true
            }
            Err(e) => {
                warn!("cannot connect to upstream socket: {}", e);
                false
            }
        }
    }

    /// Send one line to the daemon.
    pub fn send_raw(&mut self, raw: &str) {
        if !self.ensure_connected() {
            return;
        }
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let line = format!("{raw}\n");
        if let Err(e) = connection.write_all(line.as_bytes()).and_then(|_| connection.flush()) {
            warn!("cannot send to upstream: {}", e);
            self.connection = None;
        }
    }

    /// Send `data` serialized as a single line of JSON.
    pub fn send_upstream<T: Serialize + ?Sized>(&mut self, data: &T) {
        match serde_json::to_string(data) {
            Ok(line) => self.send_raw(&line),
            Err(e) => warn!("cannot serialize upstream message: {}", e),
        }
    }

    pub fn turn_screen_off(&mut self) {
        self.send_raw("tv off");
    }

    pub fn turn_screen_on(&mut self) {
        self.send_raw("tv on");
    }

    pub fn screen(&mut self, on: bool) {
        if on { self.turn_screen_on() } else { self.turn_screen_off() }
    }

    pub fn reboot(&mut self) {
        self.send_raw("reboot");
    }

    pub fn restart_service(&mut self) {
        self.send_raw("infobeamer restart");
    }

    pub fn verify_cache(&mut self) {
        self.send_raw("syncer verify_cache");
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new(DEFAULT_SYNCER_SOCKET)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").field("socket_path", &self.socket_path).field("connected", &self.is_connected()).finish()
    }
}
