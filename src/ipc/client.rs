//! Client side of the daemon socket protocol.
//!
//! Every call dials a fresh connection: the server answers one command per
//! connection.

use crate::command::Request;
use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

/// Largest one-shot response read by [`Client::send`].
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Errors talking to a daemon.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle for one daemon socket path.
#[derive(Debug, Clone)]
pub struct Client {
    path: PathBuf,
}

impl Client {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Send one command and return the single response buffer.
    pub fn send(&self, command: &str) -> Result<String, ClientError> {
        let mut stream = self.dial(command)?;
        let mut buf = vec![0u8; MAX_RESPONSE_BYTES];
        let n = stream.read(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
    }

    /// Convenience wrapper over [`send`](Self::send) for a typed request.
    pub fn request(&self, request: &Request) -> Result<String, ClientError> {
        self.send(&request.to_string())
    }

    /// Send a streaming command and copy every received line to `out`
    /// until the server closes the connection.
    pub fn stream<W: Write>(&self, command: &str, mut out: W) -> Result<(), ClientError> {
        let stream = self.dial(command)?;
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Ok(());
            }
            out.write_all(line.as_bytes())?;
            out.flush()?;
        }
    }

    /// `true` if a daemon answers `ping` with exactly `pong`.
    pub fn is_running(&self) -> bool {
        matches!(self.send("ping"), Ok(resp) if resp == "pong")
    }

    fn dial(&self, command: &str) -> Result<UnixStream, ClientError> {
        let mut stream = UnixStream::connect(&self.path).map_err(|source| ClientError::Connect {
            path: self.path.clone(),
            source,
        })?;
        stream.write_all(command.as_bytes())?;
        Ok(stream)
    }
}

//  Tests
