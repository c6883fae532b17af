// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Unix domain stream socket endpoint: one framed registration request and
// one framed acknowledgement per accepted connection.

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::frame::{self, FrameError};
use crate::identity::CallbackIdentity;

/// How long one cancellable accept sleeps between non-blocking attempts.
const ACCEPT_SLICE: Duration = Duration::from_millis(20);

/// Listening side, owned by the invoker. The socket file is removed on drop.
pub struct EndpointListener {
    listener: UnixListener,
    path: PathBuf,
    max_frame: usize,
    io_timeout: Option<Duration>,
}

impl EndpointListener {
    /// Bind at `path`, replacing a stale socket file left by a dead invoker.
    /// A non-socket file at `path` is never removed.
    pub fn bind(path: impl AsRef<Path>, max_frame: usize, io_timeout: Option<Duration>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        remove_stale_socket(&path).map_err(Error::acquire("bind endpoint"))?;
        let listener = UnixListener::bind(&path).map_err(Error::acquire("bind endpoint"))?;
        listener
            .set_nonblocking(true)
            .map_err(Error::acquire("bind endpoint"))?;
        debug!("endpoint listening on {}", path.display());
        Ok(Self {
            listener,
            path,
            max_frame,
            io_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next registrar to connect.
    pub fn accept(&self, cancel: &CancelToken, timeout: Option<Duration>) -> Result<Connection> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match self.listener.accept() {
                Ok((stream, _)) => return self.prepare(stream),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(Error::ChannelAcquisition {
                        op: "accept registrar",
                        source,
                    })
                }
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Error::TimedOut);
            }
            if cancel.sleep(ACCEPT_SLICE) {
                return Err(Error::Cancelled);
            }
        }
    }

    fn prepare(&self, stream: UnixStream) -> Result<Connection> {
        let setup = |s: &UnixStream| -> io::Result<()> {
            // Some platforms hand out accepted sockets with the listener's O_NONBLOCK.
            s.set_nonblocking(false)?;
            s.set_read_timeout(self.io_timeout)?;
            s.set_write_timeout(self.io_timeout)
        };
        setup(&stream).map_err(|e| Error::TransportIo {
            op: "configure connection",
            source: FrameError::Io(e),
        })?;
        Ok(Connection {
            stream,
            max_frame: self.max_frame,
        })
    }
}

impl Drop for EndpointListener {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("could not remove {}: {e}", self.path.display());
            }
        }
    }
}

fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            if UnixStream::connect(path).is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("another invoker is listening on {}", path.display()),
                ));
            }
            std::fs::remove_file(path)
        }
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// One accepted registrar connection.
pub struct Connection {
    stream: UnixStream,
    max_frame: usize,
}

impl Connection {
    /// Read the single registration frame. The full frame has arrived when
    /// this returns.
    pub fn read_registration(&mut self) -> Result<CallbackIdentity> {
        let payload = frame::read_frame(&mut self.stream, self.max_frame)
            .map_err(Error::transport("read registration"))?;
        Ok(CallbackIdentity::from_bytes(&payload)?)
    }

    /// Send the acknowledgement and close the connection.
    pub fn acknowledge(mut self, text: &str) -> Result<()> {
        frame::write_frame(&mut self.stream, text.as_bytes(), self.max_frame)
            .map_err(Error::transport("write acknowledgement"))?;
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        Ok(())
    }
}

/// Connecting side, used by the registrar.
#[derive(Debug, Clone)]
pub struct EndpointClient {
    path: PathBuf,
    max_frame: usize,
    io_timeout: Option<Duration>,
}

impl EndpointClient {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_frame: frame::DEFAULT_MAX_PAYLOAD,
            io_timeout: None,
        }
    }

    pub fn with_limits(mut self, max_frame: usize, io_timeout: Option<Duration>) -> Self {
        self.max_frame = max_frame;
        self.io_timeout = io_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connect, send `identity`, and block for the acknowledgement text.
    ///
    /// No retry: if nothing is listening yet this fails with
    /// [`Error::ChannelAcquisition`].
    pub fn register(&self, identity: &CallbackIdentity) -> Result<String> {
        let mut stream =
            UnixStream::connect(&self.path).map_err(Error::acquire("connect endpoint"))?;
        stream
            .set_read_timeout(self.io_timeout)
            .and_then(|_| stream.set_write_timeout(self.io_timeout))
            .map_err(Error::acquire("connect endpoint"))?;

        frame::write_frame(&mut stream, identity.as_bytes(), self.max_frame)
            .map_err(Error::transport("send registration"))?;
        let ack = frame::read_frame(&mut stream, self.max_frame)
            .map_err(Error::transport("read acknowledgement"))?;
        Ok(String::from_utf8_lossy(&ack).into_owned())
    }
}
