//! Both ends of a binkp session running against each other.

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use binkp::client::call_host;
use binkp::config::BinkConfig;
use binkp::prelude::*;
use binkp::server::{BinkServerBuilder, ConfigSessionFactory};
use tokio::io::duplex;

const LIMIT: Duration = Duration::from_secs(10);

fn originating() -> SessionConfig {
    SessionConfig::builder(Side::Originating)
        .local_address("1:1/1@fidonet")
        .expected_address("1:1/2@fidonet")
        .password("secret")
        .system_name("Caller BBS")
        .crc(true)
        .handshake_timeout(LIMIT)
        .idle_timeout(LIMIT)
        .build()
}

fn answering() -> SessionConfig {
    SessionConfig::builder(Side::Answering)
        .local_address("1:1/2@fidonet")
        .expected_address("1:1/1")
        .password("secret")
        .system_name("Answer BBS")
        .crc(true)
        .handshake_timeout(LIMIT)
        .idle_timeout(LIMIT)
        .build()
}

#[tokio::test]
async fn hello_bink_over_duplex() {
    let (a, b) = duplex(1 << 16);

    let mut queue = OutboundQueue::new();
    queue
        .push(Box::new(MemoryItem::new("hello.txt", b"Hello, Bink!".to_vec(), 1_700_000_000)))
        .unwrap();

    let mut caller = Session::new(Transport::new(a, "answerer"), originating(), queue, MemorySink::new());
    let mut answerer = Session::new(
        Transport::new(b, "caller"),
        answering(),
        OutboundQueue::new(),
        MemorySink::new(),
    );

    let (caller_report, answerer_report) = tokio::join!(caller.run(), answerer.run());
    let caller_report = caller_report.unwrap();
    let answerer_report = answerer_report.unwrap();

    assert_eq!(caller.state(), SessionState::Terminated);
    assert_eq!(answerer.state(), SessionState::Terminated);
    assert!(caller_report.secure && answerer_report.secure);
    assert!(caller_report.cram_md5 && answerer_report.cram_md5);
    assert!(caller_report.crc && answerer_report.crc);
    assert_eq!(caller_report.sent, vec!["hello.txt"]);
    assert_eq!(answerer_report.remote.system_name.as_deref(), Some("Caller BBS"));

    let (caller_queue, _) = caller.into_parts();
    assert!(caller_queue.is_empty());
    assert!(caller_queue.into_remaining().is_empty());

    let (_, sink) = answerer.into_parts();
    let files = sink.into_files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "hello.txt");
    assert_eq!(files[0].content, b"Hello, Bink!");
}

#[tokio::test]
async fn files_cross_in_both_directions() {
    let (a, b) = duplex(8192);

    let big: Vec<u8> = (0..100_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let mut caller_queue = OutboundQueue::new();
    caller_queue
        .push(Box::new(MemoryItem::new("big.pkt", big.clone(), 1)))
        .unwrap();
    caller_queue
        .push(Box::new(MemoryItem::new("small.pkt", b"small".to_vec(), 2)))
        .unwrap();

    let mut answer_queue = OutboundQueue::new();
    answer_queue
        .push(Box::new(MemoryItem::new("reply.pkt", vec![0x42; 50_000], 3)))
        .unwrap();

    let mut caller = Session::new(Transport::new(a, "answerer"), originating(), caller_queue, MemorySink::new());
    let mut answerer = Session::new(Transport::new(b, "caller"), answering(), answer_queue, MemorySink::new());

    let (left, right) = tokio::join!(caller.run(), answerer.run());
    let left = left.unwrap();
    let right = right.unwrap();

    assert_eq!(left.sent, vec!["big.pkt", "small.pkt"]);
    assert_eq!(left.received, vec!["reply.pkt"]);
    assert_eq!(right.sent, vec!["reply.pkt"]);
    assert_eq!(right.received, vec!["big.pkt", "small.pkt"]);
    assert_eq!(left.bytes_sent, right.bytes_received);

    let (_, caller_sink) = caller.into_parts();
    assert_eq!(caller_sink.files()[0].content, vec![0x42; 50_000]);
    let (_, answer_sink) = answerer.into_parts();
    assert_eq!(answer_sink.files()[0].content, big);
    assert_eq!(answer_sink.files()[1].content, b"small");
}

#[tokio::test]
async fn wrong_password_leaves_queue_intact() {
    let (a, b) = duplex(1 << 16);

    let mut queue = OutboundQueue::new();
    queue
        .push(Box::new(MemoryItem::new("mail.pkt", b"data".to_vec(), 0)))
        .unwrap();

    let mut config = originating();
    config.password = Some("wrong".into());
    let mut caller = Session::new(Transport::new(a, "answerer"), config, queue, MemorySink::new());
    let mut answerer = Session::new(
        Transport::new(b, "caller"),
        answering(),
        OutboundQueue::new(),
        MemorySink::new(),
    );

    let (left, right) = tokio::join!(caller.run(), answerer.run());
    assert!(matches!(right, Err(BinkpError::Auth(AuthError::PasswordMismatch))));
    assert!(matches!(left, Err(BinkpError::Remote(_))));
    assert_eq!(caller.state(), SessionState::Terminated);

    let (queue, _) = caller.into_parts();
    assert_eq!(queue.names(), vec!["mail.pkt"]);
}

/// Collects what the server's sessions received.
#[derive(Clone, Default)]
struct RecordingFactory {
    received: Arc<Mutex<Vec<ReceivedFile>>>,
}

impl SessionFactory for RecordingFactory {
    type Sink = MemorySink;

    fn open(&self, _peer: SocketAddr) -> io::Result<(SessionConfig, OutboundQueue, MemorySink)> {
        Ok((answering(), OutboundQueue::new(), MemorySink::new()))
    }

    fn finished(
        &self,
        _peer: SocketAddr,
        result: &BinkpResult<SessionReport>,
        _queue: OutboundQueue,
        sink: MemorySink,
    ) {
        assert!(result.is_ok(), "server session failed: {:?}", result);
        self.received.lock().unwrap().extend(sink.into_files());
    }
}

#[tokio::test]
async fn spool_to_server_over_tcp() {
    let factory = RecordingFactory::default();
    let config = BinkServerBuilder::new().bind_addr("127.0.0.1:0").build();
    let server = BinkServer::bind(config, factory.clone()).await.unwrap();
    let port = server.local_addr().unwrap().port();
    let shutdown = server.shutdown_handle();
    let serving = tokio::spawn(server.serve());

    let spool = tempfile::tempdir().unwrap();
    fs::write(spool.path().join("0001.pkt"), b"first packet").unwrap();
    fs::write(spool.path().join("0002.pkt"), b"second packet").unwrap();
    let queue = OutboundQueue::from_spool(spool.path()).unwrap();

    let outcome = call_host("127.0.0.1", port, LIMIT, originating(), queue, MemorySink::new()).await;
    let report = outcome.result.unwrap();
    assert_eq!(report.sent, vec!["0001.pkt", "0002.pkt"]);
    assert!(outcome.queue.is_empty());

    // Acknowledged spool files are removed.
    assert!(!spool.path().join("0001.pkt").exists());
    assert!(!spool.path().join("0002.pkt").exists());

    // The server task hands its sink back once the session closes.
    let mut waited = Duration::ZERO;
    while factory.received.lock().unwrap().len() < 2 && waited < LIMIT {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
    let received = factory.received.lock().unwrap().clone();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].content, b"first packet");
    assert_eq!(received[1].content, b"second packet");

    shutdown.shutdown();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn plain_password_when_caller_has_cram_off() {
    let (a, b) = duplex(1 << 16);
    let mut config = originating();
    config.cram_md5 = false;
    let mut caller = Session::new(Transport::new(a, "answerer"), config, OutboundQueue::new(), MemorySink::new());
    let mut answerer = Session::new(
        Transport::new(b, "caller"),
        answering(),
        OutboundQueue::new(),
        MemorySink::new(),
    );

    let (left, right) = tokio::join!(caller.run(), answerer.run());
    let (left, right) = (left.unwrap(), right.unwrap());
    assert!(left.secure && right.secure);
    assert!(!left.cram_md5 && !right.cram_md5);
}

#[tokio::test]
async fn server_hands_spooled_mail_to_authenticated_caller() {
    let root = tempfile::tempdir().unwrap();
    let inbound = root.path().join("in");
    let outbound = root.path().join("out");
    let config = BinkConfig::from_toml_str(&format!(
        r#"
[node]
system_name = "Answer BBS"
addresses = ["1:1/2@fidonet"]

[binkp]
bind = "127.0.0.1"
port = 0
inbound_dir = "{}"
outbound_dir = "{}"

[[callouts]]
address = "1:1/1@fidonet"
host = "127.0.0.1"
password = "secret"
"#,
        inbound.display(),
        outbound.display()
    ))
    .unwrap();

    let spool = config.outbound_spool("1:1/1");
    fs::create_dir_all(&spool).unwrap();
    fs::write(spool.join("0001.pkt"), b"held for you").unwrap();

    let server = BinkServer::bind(ServerConfig::from(&config), ConfigSessionFactory::new(config))
        .await
        .unwrap();
    let port = server.local_addr().unwrap().port();
    let shutdown = server.shutdown_handle();
    let serving = tokio::spawn(server.serve());

    let outcome = call_host("127.0.0.1", port, LIMIT, originating(), OutboundQueue::new(), MemorySink::new()).await;
    let report = outcome.result.unwrap();
    assert!(report.secure && report.cram_md5);
    assert_eq!(report.received, vec!["0001.pkt"]);
    assert_eq!(outcome.sink.files()[0].content, b"held for you");

    // The server removes the spool file once it sees our GOT.
    let mut waited = Duration::ZERO;
    while spool.join("0001.pkt").exists() && waited < LIMIT {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
    assert!(!spool.join("0001.pkt").exists());

    shutdown.shutdown();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn directory_sink_receives_file_items() {
    let outbound = tempfile::tempdir().unwrap();
    let inbound = tempfile::tempdir().unwrap();
    let source = outbound.path().join("nodelist.zip");
    fs::write(&source, vec![9u8; 70_000]).unwrap();

    let mut queue = OutboundQueue::new();
    queue.push(Box::new(FileItem::open(&source).unwrap())).unwrap();

    let (a, b) = duplex(4096);
    let mut caller = Session::new(Transport::new(a, "answerer"), originating(), queue, MemorySink::new());
    let mut answerer = Session::new(
        Transport::new(b, "caller"),
        answering(),
        OutboundQueue::new(),
        DirectorySink::new(inbound.path()).unwrap(),
    );

    let (left, right) = tokio::join!(caller.run(), answerer.run());
    left.unwrap();
    right.unwrap();

    // Not a spool item: the source stays.
    assert!(source.exists());
    assert_eq!(fs::read(inbound.path().join("nodelist.zip")).unwrap(), vec![9u8; 70_000]);
}
