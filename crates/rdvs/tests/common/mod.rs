use rdv_common::codec::{read_message, write_message};
use rdv_common::wire::Message;
use rdv_common::ClientInfo;
use rdvs::config::ServerConfig;
use rdvs::ServerState;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        max_conns: 64,
    }
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(ServerState::new(test_config(addr)));

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = rdvs::run(listener, state_clone).await {
            eprintln!("server error in test: {e}");
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state)
}

pub struct TestClient {
    pub reader: BufReader<OwnedReadHalf>,
    pub writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connect and register, asserting the handshake succeeds. Returns
    /// the client and the roster from the registration response.
    pub async fn register(addr: &SocketAddr, udp_port: u16, name: &str) -> (Self, Vec<ClientInfo>) {
        let info = ClientInfo::new(Ipv4Addr::new(127, 0, 0, 1), udp_port, name).unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        let (rd, wr) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(rd),
            writer: wr,
        };

        client
            .send(&Message::RegistrationRequest { client: info })
            .await;

        match client.recv().await {
            Message::RegistrationResponse { clients } => (client, clients),
            other => panic!("expected RegistrationResponse, got {other:?}"),
        }
    }

    /// Connect and send raw bytes as the first frame, returning the
    /// server's reply. For exercising registration refusals.
    pub async fn raw_handshake(addr: &SocketAddr, bytes: &[u8]) -> Message {
        use tokio::io::AsyncWriteExt;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (rd, mut wr) = stream.into_split();
        wr.write_all(bytes).await.unwrap();
        let mut reader = BufReader::new(rd);
        tokio::time::timeout(Duration::from_secs(5), read_message(&mut reader))
            .await
            .expect("timeout waiting for handshake reply")
            .unwrap()
    }

    pub async fn send(&mut self, msg: &Message) {
        write_message(&mut self.writer, msg).await.unwrap();
    }

    pub async fn recv(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(5), read_message(&mut self.reader))
            .await
            .expect("timeout waiting for frame")
            .unwrap()
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Message> {
        tokio::time::timeout(timeout, read_message(&mut self.reader))
            .await
            .ok()
            .and_then(Result::ok)
    }
}
