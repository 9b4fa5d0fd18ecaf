//! Datagram channel to the audio encoder.
//!
//! The PAD encoder binds a Unix datagram socket under a name derived from
//! the PAD identifier; the audio encoder sends one REQUEST message per audio
//! frame and the PAD encoder answers with exactly one PAD_DATA message.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use log::{debug, info, warn};
use tokio::net::UnixDatagram;

use dabpad_protocol::{MESSAGE_PAD_DATA, MESSAGE_REQUEST};

use crate::error::EncoderError;

/// Poll timeout for the request receive.
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(240);

/// The local datagram channel towards the audio encoder.
pub struct PadInterface {
    sock: UnixDatagram,
    peer_path: PathBuf,
    audioenc_reachable: bool,
}

impl PadInterface {
    /// Bind the encoder side socket, unlinking a stale one first.
    pub fn open(pad_ident: &str) -> Result<Self, EncoderError> {
        let local_path = PathBuf::from(format!("/tmp/{}.padenc", pad_ident));
        let peer_path = PathBuf::from(format!("/tmp/{}.audioenc", pad_ident));

        if let Err(e) = std::fs::remove_file(&local_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Unlinking of socket {} failed: {}", local_path.display(), e);
            }
        }

        let sock = UnixDatagram::bind(&local_path)?;
        info!("PAD socket bound at {}", local_path.display());

        Ok(Self {
            sock,
            peer_path,
            audioenc_reachable: true,
        })
    }

    /// Wait for the next PAD request.
    ///
    /// Returns the requested PAD length, or `None` when the poll timeout
    /// elapsed without a request. Messages of any other type are skipped.
    pub async fn receive_request(&self) -> io::Result<Option<u8>> {
        let mut buffer = [0u8; 4];

        loop {
            let received =
                tokio::time::timeout(RECEIVE_TIMEOUT, self.sock.recv_from(&mut buffer)).await;

            match received {
                Err(_elapsed) => return Ok(None),
                Ok(Err(e)) => return Err(e),
                // The socket is local to the machine; no need to check
                // where the message came from.
                Ok(Ok((len, _addr))) => {
                    if len >= 2 && buffer[0] == MESSAGE_REQUEST {
                        return Ok(Some(buffer[1]));
                    }
                    debug!("ignoring unexpected message on PAD socket ({} bytes)", len);
                }
            }
        }
    }

    /// Send one PAD_DATA message carrying `data`.
    ///
    /// An unreachable peer is logged once and then silenced until it comes
    /// back, so a not-yet-started audio encoder does not flood the log.
    pub async fn send_pad_data(&mut self, data: &[u8]) {
        let mut message = BytesMut::with_capacity(data.len() + 1);
        message.put_u8(MESSAGE_PAD_DATA);
        message.put_slice(data);

        match self.sock.send_to(&message, &self.peer_path).await {
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::ConnectionRefused
                        | io::ErrorKind::NotFound
                ) =>
            {
                if self.audioenc_reachable {
                    warn!("audio encoder at {} not reachable", self.peer_path.display());
                    self.audioenc_reachable = false;
                }
            }
            Err(e) => {
                warn!("PAD send failed: {}", e);
            }
            Ok(sent) if sent != message.len() => {
                warn!(
                    "PAD incorrect length sent: {} bytes of {} transmitted",
                    sent,
                    message.len()
                );
            }
            Ok(_) => {
                if !self.audioenc_reachable {
                    info!("audio encoder is now reachable at {}", self.peer_path.display());
                    self.audioenc_reachable = true;
                }
            }
        }
    }
}
