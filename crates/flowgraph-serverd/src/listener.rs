use std::collections::HashMap;
use std::io::{self, BufReader, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread;

use log::{error, info, warn};
use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};

use flowgraph_core::data::client::Credentials;
use flowgraph_core::data::ids::ClientId;
use flowgraph_core::Core;
use flowgraph_loop::EventFd;
use flowgraph_proto::{read_message, serialize_frame, ClientMessage, ServerMessage};

/// Connection-local id, independent of the `ClientId` the core assigns —
/// the writer thread and `Listener::send_to` address a connection by this,
/// so a stalled/half-closed socket never needs to go back through `Core` to
/// be identified.
pub type ConnId = u64;

pub enum WriterCommand {
    AddClient { conn: ConnId, stream: UnixStream },
    RemoveClient { conn: ConnId },
    SendTo { conn: ConnId, frame: Vec<u8> },
}

/// Owns every connected client's write half on one thread, so delivery
/// order for a given client matches call order regardless of what the
/// reader threads are doing (mirrors imbolc-net's single writer thread,
/// minus its outbox/backpressure bookkeeping: flowgraph's wire protocol is
/// specified as already reliable and ordered, so there is no frame-dropping
/// policy to apply here).
pub fn writer_thread(cmd_rx: Receiver<WriterCommand>) {
    let mut writers: HashMap<ConnId, UnixStream> = HashMap::new();
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            WriterCommand::AddClient { conn, stream } => {
                writers.insert(conn, stream);
            }
            WriterCommand::RemoveClient { conn } => {
                writers.remove(&conn);
            }
            WriterCommand::SendTo { conn, frame } => {
                if let Some(stream) = writers.get_mut(&conn) {
                    if let Err(e) = stream.write_all(&frame) {
                        warn!("conn {conn}: write failed ({e}), dropping");
                        writers.remove(&conn);
                    }
                }
            }
        }
    }
}

fn reader_thread(
    conn: ConnId,
    client_id: ClientId,
    stream: UnixStream,
    action_tx: Sender<(ClientId, ClientMessage)>,
    disconnect_tx: Sender<(ConnId, ClientId)>,
    wake: Arc<EventFd>,
) {
    let mut reader = BufReader::new(stream);
    loop {
        match read_message::<_, ClientMessage>(&mut reader) {
            Ok(msg) => {
                if action_tx.send((client_id, msg)).is_err() {
                    break;
                }
                let _ = wake.signal(1);
            }
            Err(e) => {
                info!("conn {conn} (client {client_id}) disconnected: {e}");
                break;
            }
        }
    }
    let _ = disconnect_tx.send((conn, client_id));
    let _ = wake.signal(1);
}

fn peer_credentials(stream: &UnixStream) -> Credentials {
    match getsockopt(stream, PeerCredentials) {
        Ok(creds) => Credentials {
            uid: creds.uid(),
            gid: creds.gid(),
            pid: creds.pid() as u32,
        },
        Err(e) => {
            warn!("SO_PEERCRED failed ({e}), treating peer as uid 0");
            Credentials { uid: 0, gid: 0, pid: 0 }
        }
    }
}

/// Accepts Unix-domain connections and wires each one into `Core` (spec
/// §3.2's "Credentials captured at socket accept"). The main loop polls
/// `as_fd()` through a `flowgraph_loop::Loop` so `accept_connections` only
/// ever runs on the thread that owns `core`; reader/writer threads talk back
/// through the channels and `wake` eventfd passed to `bind`.
pub struct Listener {
    listener: UnixListener,
    writer_tx: Sender<WriterCommand>,
    action_tx: Sender<(ClientId, ClientMessage)>,
    disconnect_tx: Sender<(ConnId, ClientId)>,
    wake: Arc<EventFd>,
    next_conn: ConnId,
    client_conns: HashMap<ClientId, ConnId>,
}

impl Listener {
    pub fn bind(
        path: &Path,
        writer_tx: Sender<WriterCommand>,
        action_tx: Sender<(ClientId, ClientMessage)>,
        disconnect_tx: Sender<(ConnId, ClientId)>,
        wake: Arc<EventFd>,
    ) -> io::Result<Self> {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            writer_tx,
            action_tx,
            disconnect_tx,
            wake,
            next_conn: 0,
            client_conns: HashMap::new(),
        })
    }

    pub fn as_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_fd()
    }

    /// Drain every pending connection. Each accepted stream is registered
    /// with `core` synchronously, before its reader thread is spawned, so
    /// the first message that thread forwards always has a live `ClientId`
    /// to address.
    pub fn accept_connections(&mut self, core: &mut Core) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    let conn = self.next_conn;
                    self.next_conn += 1;

                    if let Err(e) = stream.set_nonblocking(false) {
                        error!("conn {conn}: failed to set blocking mode: {e}");
                        continue;
                    }
                    let credentials = peer_credentials(&stream);
                    let read_stream = match stream.try_clone() {
                        Ok(s) => s,
                        Err(e) => {
                            error!("conn {conn}: failed to clone stream: {e}");
                            continue;
                        }
                    };

                    let _ = self.writer_tx.send(WriterCommand::AddClient { conn, stream });
                    let channel = Box::new(crate::channel::WireChannel {
                        conn,
                        writer_tx: self.writer_tx.clone(),
                    });
                    let client_id = core.add_client(credentials, channel);
                    self.client_conns.insert(client_id, conn);
                    info!("conn {conn} accepted, uid={} -> client {client_id}", credentials.uid);

                    let action_tx = self.action_tx.clone();
                    let disconnect_tx = self.disconnect_tx.clone();
                    let wake = Arc::clone(&self.wake);
                    thread::spawn(move || reader_thread(conn, client_id, read_stream, action_tx, disconnect_tx, wake));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("accept error: {e}");
                    break;
                }
            }
        }
    }

    /// Route a synchronous dispatch reply back to the connection `client_id`
    /// arrived on. This is the half of spec §6.1's server->client path that
    /// `channel::WireChannel` doesn't cover: replies to a specific request,
    /// as opposed to registry fan-out pushed through `Core`'s own channel.
    pub fn send_to(&self, client_id: ClientId, msg: &ServerMessage) {
        let Some(&conn) = self.client_conns.get(&client_id) else {
            return;
        };
        if let Ok(frame) = serialize_frame(msg) {
            let _ = self.writer_tx.send(WriterCommand::SendTo { conn, frame });
        }
    }

    pub fn forget(&mut self, conn: ConnId, client_id: ClientId) {
        self.client_conns.remove(&client_id);
        let _ = self.writer_tx.send(WriterCommand::RemoveClient { conn });
    }
}
