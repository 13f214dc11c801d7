use crate::messages::{PeerReply, PeerRequest};
use crate::{handlers, Shared, RPC_TIMEOUT};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, error, info};

const MAX_FRAME: usize = 10 * 1024 * 1024;

// Handles serialization of the raw message
async fn send_msg<M, W>(stream: &mut W, msg: &M) -> Result<()>
where
    M: Serialize,
    W: AsyncWriteExt + Unpin,
{
    let encoded = bincode::serialize(msg)?;
    let len = encoded.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&encoded).await?;
    Ok(())
}

// handles deserialization of the raw message
async fn recv_msg<M, R>(stream: &mut R) -> Result<M>
where
    M: for<'de> Deserialize<'de>,
    R: AsyncReadExt + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME {
        return Err(anyhow!("message too large"));
    }
    let mut buffer = vec![0u8; len];
    stream.read_exact(&mut buffer).await?;
    Ok(bincode::deserialize(&buffer)?)
}

/// One request/reply exchange with a peer. Dials per call; the whole
/// exchange shares a single timeout so an unreachable or wedged peer costs
/// at most `RPC_TIMEOUT`.
pub(crate) async fn call(addr: &str, req: &PeerRequest) -> Result<PeerReply> {
    tokio::time::timeout(RPC_TIMEOUT, async {
        let mut stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);
        send_msg(&mut stream, req).await?;
        recv_msg(&mut stream).await
    })
    .await
    .map_err(|_| anyhow!("rpc to {} timed out", addr))?
}

/// Accept loop. Each connection gets its own task serving request frames
/// until the peer hangs up. Exits when the node is killed.
pub(crate) async fn serve(shared: Arc<Shared>, listener: TcpListener) {
    info!("[node {}] listening on {}", shared.me, shared.my_addr());
    loop {
        tokio::select! {
            _ = shared.shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    if shared.is_dead() {
                        // refuse new work while shutting down
                        drop(stream);
                        break;
                    }
                    debug!("[node {}] accepted connection from {}", shared.me, peer_addr);
                    let conn = tokio::spawn(handle_conn(shared.clone(), stream));
                    // track the task so kill can abort it even if the peer
                    // never sends another frame
                    let mut conns = shared.conns.lock().unwrap();
                    conns.retain(|c| !c.is_finished());
                    conns.push(conn);
                }
                Err(e) => {
                    error!("[node {}] accept failed: {}", shared.me, e);
                    break;
                }
            },
        }
    }
    debug!("[node {}] listener stopped", shared.me);
}

async fn handle_conn(shared: Arc<Shared>, mut stream: TcpStream) {
    let _ = stream.set_nodelay(true);
    loop {
        let request: PeerRequest = match recv_msg(&mut stream).await {
            Ok(request) => request,
            // peer closed the connection, or sent junk
            Err(e) => {
                debug!("[node {}] connection closed: {}", shared.me, e);
                break;
            }
        };
        if shared.is_dead() {
            break;
        }

        let reply = match request {
            PeerRequest::ReplicaPut { username, msg, handoff } => {
                handlers::handle_replica_put(&shared, &username, msg, handoff).await
            }
        };

        if let Err(e) = send_msg(&mut stream, &reply).await {
            error!("[node {}] write error: {}", shared.me, e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Message;

    #[tokio::test]
    async fn frames_survive_the_wire() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let sent = PeerRequest::ReplicaPut {
            username: "alice".to_string(),
            msg: Message::new("hello", "inbox"),
            handoff: false,
        };
        send_msg(&mut client, &sent).await.unwrap();

        let received: PeerRequest = recv_msg(&mut server).await.unwrap();
        let PeerRequest::ReplicaPut { username, msg, handoff } = received;
        assert_eq!(username, "alice");
        assert_eq!(msg.data, "hello");
        assert!(!handoff);
    }
}
