//! End-to-end tests over a real TCP socket.

use lodekv::protocol::encode_command;
use lodekv::{accept_loop, CommandHandler, Config, Database};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start_server(db: Arc<Database>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(accept_loop(listener, CommandHandler::new(db)));
    addr
}

struct Client {
    stream: TcpStream,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
        }
    }

    /// Sends one command and asserts the exact reply bytes.
    async fn call(&mut self, args: &[&str], expected: &[u8]) {
        self.stream.write_all(&encode_command(args)).await.unwrap();
        let mut buf = vec![0u8; expected.len()];
        tokio::time::timeout(Duration::from_secs(2), self.stream.read_exact(&mut buf))
            .await
            .expect("reply timed out")
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buf),
            String::from_utf8_lossy(expected),
            "reply to {:?}",
            args
        );
    }
}

#[tokio::test]
async fn test_lru_scenario_over_tcp() {
    let addr = start_server(Arc::new(Database::in_memory(2))).await;
    let mut client = Client::connect(addr).await;

    client.call(&["SET", "a", "1"], b"+OK\r\n").await;
    client.call(&["SET", "b", "2"], b"+OK\r\n").await;
    client.call(&["GET", "a"], b"$1\r\n1\r\n").await;
    client.call(&["SET", "c", "3"], b"+OK\r\n").await;
    client.call(&["GET", "b"], b"$-1\r\n").await;
    client.call(&["GET", "a"], b"$1\r\n1\r\n").await;
    client.call(&["GET", "c"], b"$1\r\n3\r\n").await;
}

#[tokio::test]
async fn test_command_table() {
    let addr = start_server(Arc::new(Database::in_memory(100))).await;
    let mut client = Client::connect(addr).await;

    client.call(&["PING"], b"+PONG\r\n").await;
    client.call(&["set", "k", "v", "EX", "100"], b"+OK\r\n").await;
    client.call(&["TTL", "k"], b":100\r\n").await;
    client.call(&["TTL", "plain"], b":-2\r\n").await;
    client.call(&["SET", "plain", "v"], b"+OK\r\n").await;
    client.call(&["TTL", "plain"], b":-1\r\n").await;
    client.call(&["EXPIRE", "plain", "50"], b":1\r\n").await;
    client.call(&["EXPIRE", "nothing", "50"], b":0\r\n").await;
    client.call(&["DEL", "k", "plain", "nothing"], b":2\r\n").await;
    client
        .call(&["NOPE"], b"-ERR unknown command 'NOPE'\r\n")
        .await;
    client
        .call(
            &["GET"],
            b"-ERR wrong number of arguments for 'get' command\r\n",
        )
        .await;
    client.call(&["QUIT"], b"+Goodbye\r\n").await;
}

#[tokio::test]
async fn test_key_expires_after_ttl() {
    let addr = start_server(Arc::new(Database::in_memory(100))).await;
    let mut client = Client::connect(addr).await;

    client.call(&["SET", "key", "v", "EX", "1"], b"+OK\r\n").await;
    client.call(&["GET", "key"], b"$1\r\nv\r\n").await;
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    client.call(&["GET", "key"], b"$-1\r\n").await;
    client.call(&["TTL", "key"], b":-2\r\n").await;
}

#[tokio::test]
async fn test_clients_share_one_store() {
    let addr = start_server(Arc::new(Database::in_memory(100))).await;
    let mut writer = Client::connect(addr).await;
    let mut reader = Client::connect(addr).await;

    writer.call(&["SET", "shared", "yes"], b"+OK\r\n").await;
    reader.call(&["GET", "shared"], b"$3\r\nyes\r\n").await;
}

#[tokio::test]
async fn test_info_over_tcp() {
    let addr = start_server(Arc::new(Database::in_memory(100))).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(&encode_command(&["INFO", "MEMORY"]))
        .await
        .unwrap();
    let mut buf = vec![0u8; 1024];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let reply = String::from_utf8_lossy(&buf[..n]);
    assert!(reply.starts_with('$'));
    assert!(reply.contains("# Memory\r\n"));
    assert!(reply.contains("maxmemory_entries:100\r\n"));
}

#[tokio::test]
async fn test_info_clients_counts_live_connections() {
    let addr = start_server(Arc::new(Database::in_memory(100))).await;
    let mut first = Client::connect(addr).await;
    let _second = Client::connect(addr).await;
    first.call(&["PING"], b"+PONG\r\n").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    first
        .stream
        .write_all(&encode_command(&["INFO", "clients"]))
        .await
        .unwrap();
    let mut buf = vec![0u8; 1024];
    let n = tokio::time::timeout(Duration::from_secs(2), first.stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let reply = String::from_utf8_lossy(&buf[..n]);
    assert!(reply.contains("connected_clients:2\r\n"));
    assert!(reply.contains("total_connections_received:2\r\n"));
}

#[tokio::test]
async fn test_restart_over_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        dir: dir.path().to_path_buf(),
        ..Config::default()
    };

    {
        let db = Arc::new(Database::open(&config));
        let addr = start_server(Arc::clone(&db)).await;
        let mut client = Client::connect(addr).await;

        client.call(&["SET", "a", "1"], b"+OK\r\n").await;
        client.call(&["SET", "b", "2"], b"+OK\r\n").await;
        client.call(&["SET", "c", "3"], b"+OK\r\n").await;
        db.snapshot().unwrap();
        client.call(&["DEL", "b"], b":1\r\n").await;
        client.call(&["SET", "d", "4", "PX", "60000"], b"+OK\r\n").await;
    }

    let addr = start_server(Arc::new(Database::open(&config))).await;
    let mut client = Client::connect(addr).await;

    client.call(&["GET", "a"], b"$1\r\n1\r\n").await;
    client.call(&["GET", "b"], b"$-1\r\n").await;
    client.call(&["GET", "c"], b"$1\r\n3\r\n").await;
    client.call(&["GET", "d"], b"$1\r\n4\r\n").await;
    client.call(&["TTL", "d"], b":60\r\n").await;
}
