//! Dispatch loop behavior under file descriptor exhaustion.
//!
//! Lowers RLIMIT_NOFILE for the whole test process, so it lives in its own
//! test binary.

#![cfg(unix)]

use std::time::Duration;

use tcpmux_classify::{Classifier, Matcher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const LOW_FD_LIMIT: libc::rlim_t = 64;

fn nofile_limit() -> libc::rlimit {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    assert_eq!(rc, 0, "getrlimit failed");
    limit
}

fn set_nofile_limit(limit: &libc::rlimit) {
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, limit) };
    assert_eq!(rc, 0, "setrlimit failed");
}

#[tokio::test]
async fn dispatch_survives_descriptor_exhaustion() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut classifier = Classifier::new(listener);
    let mut classified = classifier.matching([Matcher::Any]);

    let shutdown = CancellationToken::new();
    let serve = tokio::spawn(classifier.serve(shutdown.clone()));

    let original = nofile_limit();
    set_nofile_limit(&libc::rlimit {
        rlim_cur: LOW_FD_LIMIT.min(original.rlim_max),
        rlim_max: original.rlim_max,
    });

    // Both ends of every connection live in this process, so accept runs out
    // of descriptors alongside the clients.
    let mut clients = Vec::new();
    for _ in 0..4 * LOW_FD_LIMIT {
        match TcpStream::connect(addr).await {
            Ok(client) => clients.push(client),
            Err(_) => break,
        }
    }
    assert!(
        (clients.len() as libc::rlim_t) < 4 * LOW_FD_LIMIT,
        "descriptor limit was never reached"
    );
    tokio::time::sleep(Duration::from_millis(300)).await;

    drop(clients);
    while let Ok(Ok(_)) = timeout(Duration::from_millis(300), classified.accept()).await {}

    assert!(
        !serve.is_finished(),
        "dispatch loop ended on a transient accept error"
    );

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"after").await.unwrap();
    timeout(Duration::from_secs(2), async {
        // Skip any connection left over from the exhausted phase.
        loop {
            let (mut stream, _) = classified.accept().await.expect("classified listener closed");
            let mut buf = [0u8; 5];
            if stream.read_exact(&mut buf).await.is_ok() && &buf == b"after" {
                break;
            }
        }
    })
    .await
    .expect("no connection after descriptors were released");

    set_nofile_limit(&original);
    shutdown.cancel();
    serve.await.unwrap().unwrap();
}
