use std::net::SocketAddr;
use std::time::Duration;

use tcpmux_classify::{ClassifiedListener, Classifier, ClassifierConfig, ClassifyError, Matcher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const CLIENT_HELLO_START: &[u8] = &[0x16, 0x03, 0x01, 0x00, 0x5f, 0x01, 0x00, 0x00, 0x5b];

struct Running {
    addr: SocketAddr,
    shutdown: CancellationToken,
    serve: JoinHandle<Result<(), ClassifyError>>,
}

async fn start(
    config: ClassifierConfig,
    classes: &[&[Matcher]],
) -> (Running, Vec<ClassifiedListener>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut classifier = Classifier::with_config(listener, config);
    let listeners = classes
        .iter()
        .map(|matchers| classifier.matching(matchers.iter().copied()))
        .collect();

    let shutdown = CancellationToken::new();
    let serve = tokio::spawn(classifier.serve(shutdown.clone()));
    (
        Running {
            addr,
            shutdown,
            serve,
        },
        listeners,
    )
}

async fn accept_payload(listener: &mut ClassifiedListener, len: usize) -> Vec<u8> {
    let (mut stream, _) = timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("accept timed out")
        .expect("accept failed");
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

async fn assert_closed_by_peer(stream: &mut TcpStream) {
    let mut buf = [0u8; 16];
    let read = timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("connection was not closed");
    assert!(matches!(read, Ok(0) | Err(_)), "expected close, got {read:?}");
}

#[tokio::test]
async fn routes_by_leading_bytes() {
    let (running, mut listeners) = start(
        ClassifierConfig::default(),
        &[&[Matcher::Http1, Matcher::Http2], &[Matcher::Any]],
    )
    .await;

    let request = b"GET / HTTP/1.1\r\nHost: a\r\n\r\n";
    let mut client = TcpStream::connect(running.addr).await.unwrap();
    client.write_all(request).await.unwrap();
    assert_eq!(accept_payload(&mut listeners[0], request.len()).await, request);

    let mut client = TcpStream::connect(running.addr).await.unwrap();
    client.write_all(CLIENT_HELLO_START).await.unwrap();
    assert_eq!(
        accept_payload(&mut listeners[1], CLIENT_HELLO_START.len()).await,
        CLIENT_HELLO_START
    );

    running.shutdown.cancel();
    running.serve.await.unwrap().unwrap();
}

#[tokio::test]
async fn request_split_across_writes_is_replayed() {
    let (running, mut listeners) = start(
        ClassifierConfig::default(),
        &[&[Matcher::Http1], &[Matcher::Any]],
    )
    .await;

    let mut client = TcpStream::connect(running.addr).await.unwrap();
    client.write_all(b"GET /a").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.write_all(b" HTTP/1.1\r\n\r\n").await.unwrap();

    let expected = b"GET /a HTTP/1.1\r\n\r\n";
    assert_eq!(accept_payload(&mut listeners[0], expected.len()).await, expected);

    running.shutdown.cancel();
}

#[tokio::test]
async fn unmatched_connection_is_closed() {
    let (running, _listeners) =
        start(ClassifierConfig::default(), &[&[Matcher::Http1, Matcher::Http2]]).await;

    let mut client = TcpStream::connect(running.addr).await.unwrap();
    client.write_all(CLIENT_HELLO_START).await.unwrap();
    assert_closed_by_peer(&mut client).await;

    running.shutdown.cancel();
}

#[tokio::test]
async fn sniff_timeout_closes_silent_client() {
    let config = ClassifierConfig {
        sniff_timeout: Some(Duration::from_millis(100)),
        ..ClassifierConfig::default()
    };
    let (running, _listeners) = start(config, &[&[Matcher::Http1]]).await;

    let mut client = TcpStream::connect(running.addr).await.unwrap();
    client.write_all(b"GET / HTTP/1.1").await.unwrap();
    assert_closed_by_peer(&mut client).await;

    running.shutdown.cancel();
}

#[tokio::test]
async fn shutdown_closes_classified_listeners() {
    let (running, mut listeners) = start(ClassifierConfig::default(), &[&[Matcher::Any]]).await;

    running.shutdown.cancel();
    running.serve.await.unwrap().unwrap();

    let accepted = timeout(Duration::from_secs(2), listeners[0].accept())
        .await
        .expect("accept should fail once the dispatch loop ended");
    assert!(matches!(accepted, Err(ClassifyError::ListenerClosed)));
}

#[tokio::test]
async fn close_unblocks_pending_accept() {
    let (running, mut listeners) = start(ClassifierConfig::default(), &[&[Matcher::Any]]).await;
    let mut listener = listeners.remove(0);
    let handle = listener.close_handle();

    let pending = tokio::spawn(async move { listener.accept().await.map(|_| ()) });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(handle.close());

    let accepted = timeout(Duration::from_secs(2), pending).await.unwrap().unwrap();
    assert!(matches!(accepted, Err(ClassifyError::ListenerClosed)));
    assert!(!handle.close());

    running.shutdown.cancel();
}
