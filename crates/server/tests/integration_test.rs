use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Duration;

use brasadb_protocol::Frame;
use brasadb_server::{Connection, ServerMetrics, handle_connection};
use brasadb_storage::{Aof, FsyncPolicy, Store, SystemClock, replay_into};

/// Helper: sobe um servidor mínimo na porta dada, com store e AOF injetados.
async fn start_server_with(
    port: u16,
    store: Store,
    aof: Option<Arc<Aof>>,
    metrics: Arc<ServerMetrics>,
) -> tokio::task::JoinHandle<()> {
    let handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}"))
            .await
            .unwrap();
        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

        loop {
            let (socket, _) = listener.accept().await.unwrap();
            let store = store.clone();
            let aof = aof.clone();
            let metrics = metrics.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let conn = Connection::new(socket);
                let _ = handle_connection(conn, store, aof, metrics, &mut shutdown_rx).await;
            });
        }
    });

    // Aguardar servidor estar pronto
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle
}

async fn start_server(port: u16) -> tokio::task::JoinHandle<()> {
    let metrics = Arc::new(ServerMetrics::new().unwrap());
    let store = Store::with(Arc::new(SystemClock), metrics.clone());
    start_server_with(port, store, None, metrics).await
}

/// Helper: envia bytes crus no stream.
async fn send_raw(stream: &mut TcpStream, bytes: &[u8]) {
    stream.write_all(bytes).await.unwrap();
    stream.flush().await.unwrap();
}

/// Helper: lê um frame completo do stream.
async fn read_frame(stream: &mut TcpStream) -> Frame {
    let mut response_buf = bytes::BytesMut::with_capacity(4096);
    loop {
        let n = stream.read_buf(&mut response_buf).await.unwrap();
        assert!(n > 0, "server closed connection unexpectedly");

        let mut cursor = Cursor::new(&response_buf[..]);
        if Frame::check(&mut cursor).is_ok() {
            cursor.set_position(0);
            return Frame::parse(&mut cursor).unwrap();
        }
    }
}

/// Helper: executa um comando e retorna o frame de resposta.
async fn send_command(stream: &mut TcpStream, args: &[&str]) -> Frame {
    let frame = Frame::array_from_strs(args);
    let mut buf = bytes::BytesMut::new();
    frame.encode(&mut buf);
    send_raw(stream, &buf).await;
    read_frame(stream).await
}

async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(format!("127.0.0.1:{port}"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_ping_pong() {
    let port = 16500;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["PING"]).await;
    assert_eq!(response, Frame::Simple("PONG".into()));

    let response = send_command(&mut stream, &["PING", "hello"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("hello")));
}

#[tokio::test]
async fn test_set_get() {
    let port = 16501;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["SET", "mykey", "myvalue"]).await;
    assert_eq!(response, Frame::Simple("OK".into()));

    let response = send_command(&mut stream, &["GET", "mykey"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("myvalue")));
}

#[tokio::test]
async fn test_set_existing_key_fails() {
    let port = 16502;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "key", "v1"]).await;
    let response = send_command(&mut stream, &["SET", "key", "v2"]).await;
    assert_eq!(response, Frame::Error("ERR key already exists".into()));

    // valor original intacto
    let response = send_command(&mut stream, &["GET", "key"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("v1")));
}

#[tokio::test]
async fn test_get_nonexistent() {
    let port = 16503;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["GET", "missing"]).await;
    assert_eq!(response, Frame::Null);
}

#[tokio::test]
async fn test_del() {
    let port = 16504;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "a", "1"]).await;

    let response = send_command(&mut stream, &["DEL", "a"]).await;
    assert_eq!(response, Frame::Integer(1));

    let response = send_command(&mut stream, &["DEL", "a"]).await;
    assert_eq!(response, Frame::Integer(0));

    let response = send_command(&mut stream, &["GET", "a"]).await;
    assert_eq!(response, Frame::Null);
}

#[tokio::test]
async fn test_expire_ttl_persist_flow() {
    let port = 16505;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "k", "v"]).await;

    // sem expiração armada
    let response = send_command(&mut stream, &["TTL", "k"]).await;
    assert_eq!(response, Frame::Integer(-1));

    let response = send_command(&mut stream, &["EXPIRE", "k", "100"]).await;
    assert_eq!(response, Frame::Integer(1));

    let response = send_command(&mut stream, &["TTL", "k"]).await;
    match response {
        Frame::Integer(n) => assert!(n > 0 && n <= 100, "ttl fora do esperado: {n}"),
        other => panic!("esperava inteiro, veio {other:?}"),
    }

    let response = send_command(&mut stream, &["PERSIST", "k"]).await;
    assert_eq!(response, Frame::Integer(1));

    let response = send_command(&mut stream, &["TTL", "k"]).await;
    assert_eq!(response, Frame::Integer(-1));

    // chave ausente
    let response = send_command(&mut stream, &["EXPIRE", "nada", "10"]).await;
    assert_eq!(response, Frame::Integer(0));
    let response = send_command(&mut stream, &["TTL", "nada"]).await;
    assert_eq!(response, Frame::Integer(-1));
}

#[tokio::test]
async fn test_expired_key_disappears() {
    let port = 16506;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "temp", "val"]).await;
    let response = send_command(&mut stream, &["EXPIRE", "temp", "1"]).await;
    assert_eq!(response, Frame::Integer(1));

    let response = send_command(&mut stream, &["GET", "temp"]).await;
    assert_eq!(response, Frame::Bulk(Bytes::from("val")));

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let response = send_command(&mut stream, &["GET", "temp"]).await;
    assert_eq!(response, Frame::Null);

    // expirada conta como ausente: SET é aceito de novo
    let response = send_command(&mut stream, &["SET", "temp", "novo"]).await;
    assert_eq!(response, Frame::Simple("OK".into()));
}

#[tokio::test]
async fn test_keys() {
    let port = 16507;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "a", "1"]).await;
    send_command(&mut stream, &["SET", "b", "2"]).await;

    let response = send_command(&mut stream, &["KEYS"]).await;
    let Frame::Array(items) = response else {
        panic!("esperava array");
    };
    let mut names: Vec<_> = items
        .into_iter()
        .map(|f| match f {
            Frame::Bulk(b) => b,
            other => panic!("esperava bulk, veio {other:?}"),
        })
        .collect();
    names.sort();
    assert_eq!(names, vec![Bytes::from("a"), Bytes::from("b")]);
}

#[tokio::test]
async fn test_unknown_command() {
    let port = 16508;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["FOOBAR"]).await;
    assert_eq!(response, Frame::Error("ERR unknown command".into()));
}

#[tokio::test]
async fn test_wrong_arity() {
    let port = 16509;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    let response = send_command(&mut stream, &["SET", "k"]).await;
    assert_eq!(
        response,
        Frame::Error("ERR wrong number of arguments for SET command".into())
    );

    let response = send_command(&mut stream, &["GET", "a", "b"]).await;
    assert_eq!(
        response,
        Frame::Error("ERR wrong number of arguments for GET command".into())
    );
}

#[tokio::test]
async fn test_malformed_input_keeps_connection() {
    let port = 16510;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    // byte de tipo inválido: resposta de erro, conexão sobrevive
    send_raw(&mut stream, b"?lixo\r\n").await;
    let response = read_frame(&mut stream).await;
    assert_eq!(response, Frame::Error("ERR invalid command".into()));

    let response = send_command(&mut stream, &["PING"]).await;
    assert_eq!(response, Frame::Simple("PONG".into()));
}

#[tokio::test]
async fn test_frame_split_across_writes() {
    let port = 16511;
    let _server = start_server(port).await;
    let mut stream = connect(port).await;

    let frame = Frame::array_from_strs(&["SET", "chave", "valor"]);
    let mut buf = bytes::BytesMut::new();
    frame.encode(&mut buf);
    let mid = buf.len() / 2;

    send_raw(&mut stream, &buf[..mid]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    send_raw(&mut stream, &buf[mid..]).await;

    let response = read_frame(&mut stream).await;
    assert_eq!(response, Frame::Simple("OK".into()));
}

#[tokio::test]
async fn test_metrics_exposition() {
    let port = 16512;
    let metrics = Arc::new(ServerMetrics::new().unwrap());
    let store = Store::with(Arc::new(SystemClock), metrics.clone());
    let _server = start_server_with(port, store, None, metrics).await;
    let mut stream = connect(port).await;

    send_command(&mut stream, &["SET", "chave", "valor"]).await;

    let response = send_command(&mut stream, &["METRICS"]).await;
    let Frame::Bulk(text) = response else {
        panic!("esperava bulk com texto de métricas");
    };
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("brasadb_commands_total{command=\"set\"} 1"));
    // chave (5) + valor (5)
    assert!(text.contains("brasadb_memory_bytes 10"));
}

#[tokio::test]
async fn test_writes_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let aof_path = dir.path().join("restart.aof");

    // primeira encarnação: grava e cai
    {
        let port = 16513;
        let metrics = Arc::new(ServerMetrics::new().unwrap());
        let store = Store::with(Arc::new(SystemClock), metrics.clone());
        let aof = Arc::new(Aof::open(&aof_path, FsyncPolicy::Always).await.unwrap());
        let server = start_server_with(port, store, Some(aof), metrics).await;
        let mut stream = connect(port).await;

        send_command(&mut stream, &["SET", "fica", "1"]).await;
        send_command(&mut stream, &["SET", "some", "2"]).await;
        send_command(&mut stream, &["DEL", "some"]).await;

        server.abort();
    }

    // segunda encarnação: replay + servidor novo
    {
        let port = 16514;
        let metrics = Arc::new(ServerMetrics::new().unwrap());
        let store = Store::with(Arc::new(SystemClock), metrics.clone());

        let count = replay_into(&aof_path, &store).await.unwrap();
        assert_eq!(count, 3);

        let aof = Arc::new(Aof::open(&aof_path, FsyncPolicy::Always).await.unwrap());
        let _server = start_server_with(port, store, Some(aof), metrics).await;
        let mut stream = connect(port).await;

        let response = send_command(&mut stream, &["GET", "fica"]).await;
        assert_eq!(response, Frame::Bulk(Bytes::from("1")));

        let response = send_command(&mut stream, &["GET", "some"]).await;
        assert_eq!(response, Frame::Null);
    }
}
