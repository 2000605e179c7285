// Transport: TCP connect plus the two background threads.
//
// `Comm::connect` dials the server, hands the write half to the session,
// and spawns:
//
//   - the reader thread: pulls raw bytes, logs them, reassembles lines,
//     and feeds each one to `Session::process_line`;
//   - the sender thread: the paced command loop in `sender.rs`.
//
// `stop` runs the shutdown sequence (flag, close link, wake all waits)
// and joins both threads. Closing the socket is what unblocks the reader
// from its blocking read.

use std::io::Read;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bot_arena_protocol::framing::LineAssembler;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::sender;
use crate::session::Session;

const READ_BUF_LEN: usize = 4096;

pub struct Comm {
    session: Arc<Session>,
    reader: Option<JoinHandle<()>>,
    sender: Option<JoinHandle<()>>,
}

impl Comm {
    /// Connect to `addr` and start the background threads. The session must
    /// be freshly created (state `Connecting`).
    pub fn connect(session: Arc<Session>, addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).map_err(|source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        info!(%addr, "connected");

        let read_half = stream.try_clone().map_err(ClientError::Io)?;
        session.attach_link(stream);

        let reader = {
            let session = Arc::clone(&session);
            thread::Builder::new()
                .name("arena-reader".into())
                .spawn(move || reader_loop(&session, read_half))
                .map_err(ClientError::Io)?
        };
        let sender = {
            let session = Arc::clone(&session);
            thread::Builder::new()
                .name("arena-sender".into())
                .spawn(move || sender::run(&session))
                .map_err(ClientError::Io)?
        };

        Ok(Self {
            session,
            reader: Some(reader),
            sender: Some(sender),
        })
    }

    /// Shut the session down and join both background threads.
    pub fn stop(&mut self) {
        self.session.shutdown();
        for handle in [self.reader.take(), self.sender.take()].into_iter().flatten() {
            if handle.join().is_err() {
                warn!("background thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Comm {
    fn drop(&mut self) {
        self.stop();
    }
}

fn reader_loop(session: &Session, mut stream: TcpStream) {
    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; READ_BUF_LEN];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => {
                if !session.is_terminating() {
                    session.abort("server closed the connection");
                }
                break;
            }
            Ok(n) => {
                session.logger().data_in(&buf[..n]);
                match assembler.push(&buf[..n]) {
                    Ok(lines) => {
                        for line in &lines {
                            session.process_line(line);
                        }
                    }
                    Err(e) => {
                        session.abort(&format!("inbound stream is corrupt: {e}"));
                        break;
                    }
                }
            }
            Err(e) => {
                if !session.is_terminating() {
                    session.abort(&format!("read failed: {e}"));
                }
                break;
            }
        }
    }
    debug!("reader thread exiting");
}
