use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::cmd::{Cmd, CommandName};
use crate::codec::FrameCodec;
use crate::config::Config;
use crate::frame::Frame;
use crate::transport::Transport;
use crate::{Error, Result};

type Responder = oneshot::Sender<Result<Frame>>;

struct Request {
    frame: Frame,
    responder: Responder,
}

/// Handle to one multiplexed connection to the store.
///
/// The socket is owned by a background driver task. Every call hands its command and a one-shot
/// responder to the driver, which writes commands in arrival order and, since the store answers
/// in order, routes each reply to the oldest pending responder. Handles are cheap to clone and
/// never need a lock.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: Uuid,
    requests: mpsc::UnboundedSender<Request>,
}

impl Connection {
    /// Opens a connection to the store described by `config`.
    ///
    /// Returns immediately, the TCP connect and the AUTH handshake happen in the background.
    /// Commands issued before the handshake completes are queued; if it fails, the failure is
    /// logged and every queued or later command resolves with the error. Must be called from
    /// within a Tokio runtime.
    pub fn open(config: &Config) -> Connection {
        Connection::with_address(config.address(), config)
    }

    /// Same as `open`, but connecting to an explicit `host:port` instead of the one derived from
    /// the host policy.
    pub fn with_address(address: impl Into<String>, config: &Config) -> Connection {
        let (requests, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        tokio::spawn(drive(
            id,
            address.into(),
            config.password.clone(),
            config.max_frame_size,
            receiver,
        ));

        Connection { id, requests }
    }

    /// Whether the driver task is gone, in which case every call fails.
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}

#[async_trait]
impl Transport for Connection {
    async fn call(&self, cmd: Cmd) -> Result<Frame> {
        let (responder, reply) = oneshot::channel();
        let frame = Frame::from(cmd);

        self.requests
            .send(Request { frame, responder })
            .map_err(|_| Error::Closed)?;

        reply.await.map_err(|_| Error::Closed)?
    }
}

enum Shutdown {
    /// Every handle was dropped.
    Released,
    /// The store closed the socket.
    Closed,
    Failed(String),
}

impl Shutdown {
    fn error(&self) -> Error {
        match self {
            Shutdown::Released | Shutdown::Closed => Error::Closed,
            Shutdown::Failed(reason) => Error::Connection(reason.clone()),
        }
    }
}

#[instrument(
    name = "connection",
    skip_all,
    fields(connection_id = %id, address = %address)
)]
async fn drive(
    id: Uuid,
    address: String,
    password: Option<String>,
    max_frame_size: usize,
    mut requests: mpsc::UnboundedReceiver<Request>,
) {
    let framed = match handshake(&address, password, max_frame_size).await {
        Ok(framed) => {
            info!("connected to store");
            framed
        }
        Err(err) => {
            error!("failed to connect to store: {}", err);
            reject_queued(&mut requests, &Shutdown::Failed(err.to_string())).await;
            return;
        }
    };

    let (mut sink, mut stream) = framed.split();
    let mut pending: VecDeque<Responder> = VecDeque::new();

    let shutdown = loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(Request { frame, responder }) = request else {
                    debug!("all handles dropped");
                    break Shutdown::Released;
                };

                debug!(command = %frame, "sending command");
                match sink.send(frame).await {
                    Ok(()) => pending.push_back(responder),
                    Err(err) => {
                        error!("failed to send command: {}", err);
                        let reason = err.to_string();
                        let _ = responder.send(Err(err));
                        break Shutdown::Failed(reason);
                    }
                }
            }
            reply = stream.next() => match reply {
                Some(Ok(frame)) => match pending.pop_front() {
                    Some(responder) => {
                        // The caller may have given up waiting, that's fine.
                        let _ = responder.send(into_result(frame));
                    }
                    None => warn!(reply = %frame, "dropping reply without a pending command"),
                },
                Some(Err(err)) => {
                    error!("failed to read reply: {}", err);
                    break Shutdown::Failed(err.to_string());
                }
                None => {
                    info!("connection closed by the store");
                    break Shutdown::Closed;
                }
            },
        }
    };

    for responder in pending.drain(..) {
        let _ = responder.send(Err(shutdown.error()));
    }
    reject_queued(&mut requests, &shutdown).await;

    info!("connection closed");
}

async fn handshake(
    address: &str,
    password: Option<String>,
    max_frame_size: usize,
) -> Result<Framed<TcpStream, FrameCodec>> {
    let stream = TcpStream::connect(address).await?;
    stream.set_nodelay(true)?;

    let mut framed = Framed::new(stream, FrameCodec::new(max_frame_size));

    if let Some(password) = password {
        framed
            .send(Frame::from(Cmd::new(CommandName::Auth).arg(password)))
            .await?;

        match framed.next().await {
            Some(Ok(Frame::Error(msg))) => {
                return Err(Error::Connection(format!("authentication failed: {}", msg)))
            }
            Some(Ok(_)) => debug!("authenticated"),
            Some(Err(err)) => return Err(err),
            None => return Err(Error::Closed),
        }
    }

    Ok(framed)
}

// Closing first makes later sends fail fast, then whatever was already queued gets the error.
async fn reject_queued(requests: &mut mpsc::UnboundedReceiver<Request>, shutdown: &Shutdown) {
    requests.close();
    while let Some(request) = requests.recv().await {
        let _ = request.responder.send(Err(shutdown.error()));
    }
}

fn into_result(frame: Frame) -> Result<Frame> {
    match frame {
        Frame::Error(msg) => Err(Error::Server(msg)),
        frame => Ok(frame),
    }
}
