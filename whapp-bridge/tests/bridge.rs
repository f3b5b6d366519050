use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Value, json};
use std::{
    collections::{HashMap, VecDeque},
    error::Error,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};
use tokio::{
    io::{
        AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
        duplex, split,
    },
    net::TcpListener,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use whapp_bridge::{
    Bridge, BridgeConfig, BridgeError, BridgeState, Chat, Contact, ContactNames, LoginCodeRequest,
    Message, MessageGroup, MessageInfo, Session, SessionError, SessionLock,
    whapp_media::MediaDescriptor,
};

const SESSION_ID: &str = "test-session";
const QR_CODE: &str = "2@fake-login-code";
const MEDIA_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";
const IMAGE_KEYS: &str = "576861747341707020496d616765204b657973";
/// 48 byte ciphertext followed by a dummy 10 byte trailer.
const BLOB: &str = "Howy1iSHlID/Rz/RO4G9LGrJjRDbw4xtTaYlr9ZpeSgNF3/+VpP+3w02ZE4SvQ9Yqqqqqqqqqqqqqg==";
const PLAINTEXT: &str = "d2hhcHAgbWVkaWEgZGVjcnlwdGlvbiB0ZXN0IHZlYyE=";
const BLOB_URL: &str = "https://mmg.example/blob.enc";
const WAIT: Duration = Duration::from_secs(5);

/// Records every session call and counts calls running at the same time.
#[derive(Default)]
struct Recorder {
    active: AtomicUsize,
    overlaps: AtomicUsize,
    calls: Mutex<Vec<String>>,
    qr_running: AtomicBool,
    unread: Mutex<VecDeque<Vec<MessageGroup>>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl Recorder {
    fn enter(&self, name: impl Into<String>) -> Call<'_> {
        let name = name.into();

        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        self.calls.lock().unwrap().push(name.clone());
        Call { recorder: self, name }
    }

    fn calls(&self, prefix: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|x| x.trim_start_matches('/').starts_with(prefix))
            .cloned()
            .collect()
    }

    fn queue_unread(&self, groups: Vec<MessageGroup>) {
        self.unread.lock().unwrap().push_back(groups);
    }

    fn add_blob(&self, url: &str, data: Vec<u8>) {
        self.blobs.lock().unwrap().insert(url.to_owned(), data);
    }
}

struct Call<'a> {
    recorder: &'a Recorder,
    name: String,
}

impl Drop for Call<'_> {
    fn drop(&mut self) {
        self.recorder
            .calls
            .lock()
            .unwrap()
            .push(format!("/{}", self.name));
        self.recorder.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeSession {
    recorder: Arc<Recorder>,
    block_qr: bool,
    logged_in: bool,
    delay: Duration,
}

impl FakeSession {
    fn new(recorder: &Arc<Recorder>) -> Self {
        Self {
            recorder: recorder.clone(),
            block_qr: false,
            logged_in: false,
            delay: Duration::from_millis(2),
        }
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn connect(&mut self) -> Result<(), SessionError> {
        let _call = self.recorder.enter("connect");
        Ok(())
    }

    fn request_login_code(&mut self, cancel: &CancellationToken) -> Result<String, SessionError> {
        let _call = self.recorder.enter("qr");

        if self.logged_in {
            return Err(SessionError::LoggedIn);
        }

        if !self.block_qr {
            return Ok(QR_CODE.to_owned());
        }

        self.recorder.qr_running.store(true, Ordering::SeqCst);

        while !cancel.is_cancelled() {
            thread::sleep(Duration::from_millis(5));
        }

        self.recorder.qr_running.store(false, Ordering::SeqCst);
        Err(SessionError::Cancelled)
    }

    async fn await_login(&mut self) -> Result<(), SessionError> {
        let _call = self.recorder.enter("login");
        sleep(self.delay).await;
        Ok(())
    }

    fn list_chats(&mut self) -> BoxStream<'_, Result<Chat, SessionError>> {
        stream::iter(vec![
            Ok(Chat::User {
                id: "1@c.us".to_owned(),
                name: Some("Alice".to_owned()),
            }),
            Ok(Chat::Group {
                id: "2@g.us".to_owned(),
                name: Some("Team".to_owned()),
                participants: vec![contact("1@c.us")],
                admins: vec![],
            }),
        ])
        .boxed()
    }

    async fn list_unread(
        &mut self,
        include_me: bool,
        include_notifications: bool,
    ) -> Result<Vec<MessageGroup>, SessionError> {
        let _call = self
            .recorder
            .enter(format!("unread:{}:{}", include_me, include_notifications));
        sleep(self.delay).await;
        let groups = self.recorder.unread.lock().unwrap().pop_front();
        Ok(groups.unwrap_or_default())
    }

    async fn send_message(
        &mut self,
        _chat_id: &str,
        content: &str,
        _reply_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let _call = self.recorder.enter(format!("send:{}", content));
        sleep(self.delay).await;

        if content == "fail" {
            return Err(SessionError::Driver("chat not found".to_owned()));
        }

        Ok(())
    }

    async fn fetch_media_bytes(
        &mut self,
        media: &MediaDescriptor,
    ) -> Result<Vec<u8>, SessionError> {
        let _call = self.recorder.enter(format!("fetch:{}", media.source_url));
        sleep(self.delay).await;
        let blob = self.recorder.blobs.lock().unwrap().get(&media.source_url).cloned();
        blob.ok_or_else(|| SessionError::Fetch(format!("{} (HTTP 404 Not Found)", media.source_url)))
    }
}

fn contact(id: &str) -> Contact {
    Contact {
        id: id.to_owned(),
        names: ContactNames::default(),
    }
}

fn info(id: &str, timestamp: f64) -> MessageInfo {
    MessageInfo {
        id: id.to_owned(),
        timestamp,
        sender: Some(contact("1@c.us")),
        is_sent_by_me: false,
        is_sent_by_me_from_web: false,
        quoted_msg_obj: None,
    }
}

fn text(id: &str, timestamp: f64) -> Message {
    Message::Text {
        info: info(id, timestamp),
        body: format!("body of {}", id),
    }
}

fn media(id: &str, timestamp: f64, url: &str) -> Message {
    Message::Media {
        info: info(id, timestamp),
        media: MediaDescriptor::new(url, MEDIA_KEY, IMAGE_KEYS),
        filename: None,
        caption: Some("look".to_owned()),
    }
}

fn group(messages: Vec<Message>) -> MessageGroup {
    MessageGroup {
        chat: Chat::User {
            id: "1@c.us".to_owned(),
            name: Some("Alice".to_owned()),
        },
        messages,
    }
}

fn blob() -> Vec<u8> {
    use base64::Engine;
    base64::prelude::BASE64_STANDARD.decode(BLOB).unwrap()
}

fn config() -> BridgeConfig {
    BridgeConfig {
        poll_interval: Duration::from_millis(10),
        ..BridgeConfig::new(SESSION_ID)
    }
}

/// Controller side of an in-memory connection to a running bridge.
struct Controller {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    input: WriteHalf<DuplexStream>,
    task: JoinHandle<Result<(), BridgeError>>,
    shutdown: CancellationToken,
}

impl Controller {
    fn start(session: FakeSession, config: BridgeConfig) -> Self {
        let (controller, remote) = duplex(64 * 1024);
        let (reader, writer) = split(remote);
        let mut bridge = Bridge::new(session, config);
        let shutdown = bridge.shutdown_token();
        let task = tokio::spawn(async move { bridge.run(reader, writer).await });
        let (output, input) = split(controller);

        Self {
            lines: BufReader::new(output).lines(),
            input,
            task,
            shutdown,
        }
    }

    async fn line(&mut self) -> Option<String> {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .expect("could not read line")
    }

    async fn event(&mut self) -> Value {
        let line = self.line().await.expect("bridge closed the connection");
        serde_json::from_str(&line).expect("event line is not json")
    }

    /// Next event with this name, skipping unread polls.
    async fn expect(&mut self, name: &str) -> Value {
        loop {
            let event = self.event().await;

            if event["event"] == name {
                return event;
            }

            assert_eq!(event["event"], "unread-messages", "unexpected {}", event);
        }
    }

    async fn send(&mut self, line: &str) {
        self.send_bytes(line.as_bytes()).await;
    }

    async fn send_bytes(&mut self, line: &[u8]) {
        self.input.write_all(line).await.unwrap();
        self.input.write_all(b"\n").await.unwrap();
        self.input.flush().await.unwrap();
    }

    async fn handshake(&mut self) -> Vec<Value> {
        assert_eq!(self.line().await.as_deref(), Some(SESSION_ID));
        vec![
            self.expect("qr").await,
            self.expect("ok").await,
            self.expect("chat").await,
            self.expect("chat").await,
        ]
    }

    /// Hang up and wait for the bridge to stop.
    async fn finish(mut self) -> Result<(), BridgeError> {
        self.input.shutdown().await.unwrap();
        timeout(WAIT, self.task)
            .await
            .expect("bridge did not stop")
            .expect("bridge task panicked")
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_handshake() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    let mut controller = Controller::start(FakeSession::new(&recorder), config());
    let events = controller.handshake().await;

    assert_eq!(events[0]["args"], json!([{ "code": QR_CODE }]));
    assert_eq!(events[1]["args"], json!([{ "id": "qr" }]));
    assert_eq!(events[2]["args"][0]["id"], "1@c.us");
    assert!(events[2]["args"][0].get("participants").is_none());
    assert_eq!(events[3]["args"][0]["participants"][0]["id"], "1@c.us");

    controller.finish().await?;
    assert_eq!(recorder.calls("connect"), ["connect", "/connect"]);
    assert_eq!(recorder.calls("qr"), ["qr", "/qr"]);
    Ok(())
}

#[tokio::test]
async fn test_sends_are_sequential() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    let mut session = FakeSession::new(&recorder);
    session.delay = Duration::from_millis(20);

    let mut controller = Controller::start(session, config());
    controller.handshake().await;

    for content in ["one", "two", "three"] {
        controller
            .send(&json!({ "command": "send", "args": ["1@c.us", content, null] }).to_string())
            .await;
    }

    controller.finish().await?;
    assert_eq!(
        recorder.calls("send:"),
        ["send:one", "/send:one", "send:two", "/send:two", "send:three", "/send:three"]
    );
    Ok(())
}

#[tokio::test]
async fn test_session_calls_never_overlap() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    recorder.add_blob(BLOB_URL, blob());

    for i in 0..5 {
        recorder.queue_unread(vec![group(vec![
            text(&format!("t{}", i), 10.0 + i as f64),
            media(&format!("m{}", i), 5.0, BLOB_URL),
        ])]);
    }

    let mut session = FakeSession::new(&recorder);
    session.delay = Duration::from_millis(5);
    let mut controller = Controller::start(session, config());
    controller.handshake().await;

    for i in 0..5 {
        controller
            .send(&json!({ "command": "send", "args": ["1@c.us", format!("msg {}", i)] }).to_string())
            .await;
        controller
            .send(&json!({ "command": "download", "args": [i, { "sourceUrl": BLOB_URL, "mediaKey": MEDIA_KEY, "contextInfo": IMAGE_KEYS }] }).to_string())
            .await;
    }

    for _ in 0..5 {
        controller.expect("download-ready").await;
    }

    wait_until(|| recorder.unread.lock().unwrap().is_empty()).await;
    controller.finish().await?;

    assert_eq!(recorder.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.active.load(Ordering::SeqCst), 0);
    assert!(recorder.calls("unread:true:false").len() >= 10);
    Ok(())
}

#[tokio::test]
async fn test_unread_sorted_by_timestamp() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    recorder.queue_unread(vec![group(vec![
        text("c", 3.0),
        text("a1", 1.0),
        text("b", 2.0),
        text("a2", 1.0),
    ])]);

    let mut controller = Controller::start(FakeSession::new(&recorder), config());
    controller.handshake().await;

    let event = controller.expect("unread-messages").await;
    let messages = event["args"][0]["messages"].as_array().unwrap();
    let ids = messages.iter().map(|x| x["id"].as_str().unwrap()).collect::<Vec<_>>();
    let timestamps = messages.iter().map(|x| x["timestamp"].as_f64().unwrap()).collect::<Vec<_>>();

    assert_eq!(ids, ["a1", "a2", "b", "c"]);
    assert!(timestamps.windows(2).all(|x| x[0] <= x[1]));
    assert_eq!(messages[0]["isText"], true);
    assert_eq!(messages[0]["body"], "body of a1");
    assert_eq!(event["args"][0]["chat"]["id"], "1@c.us");

    controller.finish().await?;
    Ok(())
}

#[tokio::test]
async fn test_download_ready() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    recorder.add_blob(BLOB_URL, blob());

    let mut controller = Controller::start(FakeSession::new(&recorder), config());
    controller.handshake().await;
    controller
        .send(&format!(
            r#"{{"command": "download", "args": [7, {{"clientUrl": "{}", "mediaKey": "{}", "type": "image"}}]}}"#,
            BLOB_URL, MEDIA_KEY
        ))
        .await;

    let event = controller.expect("download-ready").await;
    assert_eq!(event["args"], json!(["7", PLAINTEXT]));

    controller.finish().await?;
    Ok(())
}

#[tokio::test]
async fn test_command_failures_become_error_events() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    recorder.add_blob(BLOB_URL, blob());
    let mut controller = Controller::start(FakeSession::new(&recorder), config());
    controller.handshake().await;

    controller.send("").await;
    controller.send("not json at all").await;
    let event = controller.expect("error").await;
    assert_eq!(event["args"][0]["kind"], "format");
    assert!(event["args"][0].get("command").is_none());

    controller
        .send(r#"{"command": "eval", "args": ["import os"]}"#)
        .await;
    assert_eq!(controller.expect("error").await["args"][0]["kind"], "protocol");

    controller.send(r#"{"command": "reboot", "args": []}"#).await;
    assert_eq!(controller.expect("error").await["args"][0]["kind"], "protocol");

    controller
        .send(r#"{"command": "send", "args": ["1@c.us", "fail"]}"#)
        .await;
    let event = controller.expect("error").await;
    assert_eq!(event["args"][0]["kind"], "driver");
    assert_eq!(event["args"][0]["command"], "send");

    controller
        .send(r#"{"command": "download", "args": ["9", {"sourceUrl": "https://mmg.example/gone", "mediaKey": "AAEC", "contextInfo": "00"}]}"#)
        .await;
    let event = controller.expect("error").await;
    assert_eq!(event["args"][0], json!({
        "kind": "network",
        "message": event["args"][0]["message"],
        "command": "download",
        "id": "9",
    }));

    controller
        .send(&format!(
            r#"{{"command": "download", "args": ["10", {{"sourceUrl": "{}", "mediaKey": "not base64!", "contextInfo": "00"}}]}}"#,
            BLOB_URL
        ))
        .await;
    let event = controller.expect("error").await;
    assert_eq!(event["args"][0]["kind"], "format");
    assert_eq!(event["args"][0]["id"], "10");

    // The loop is still alive.
    controller
        .send(r#"{"command": "send", "args": ["1@c.us", "still here"]}"#)
        .await;
    controller.finish().await?;
    assert_eq!(recorder.calls("send:still here").len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_unreadable_lines_do_not_stop_commands() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    let mut controller = Controller::start(FakeSession::new(&recorder), config());
    controller.handshake().await;

    controller
        .send_bytes(b"\xff\xfe{\"command\": \"send\", \"args\": [\"1@c.us\", \"lost\"]}")
        .await;
    let event = controller.expect("error").await;
    assert_eq!(event["args"][0]["kind"], "format");
    assert!(event["args"][0]["message"].as_str().unwrap().contains("utf-8"));

    controller
        .send(r#"{"command": "send", "args": ["1@c.us", "after"]}"#)
        .await;
    controller.finish().await?;
    assert!(recorder.calls("send:lost").is_empty());
    assert_eq!(recorder.calls("send:after"), ["send:after", "/send:after"]);
    Ok(())
}

#[tokio::test]
async fn test_already_logged_in_skips_login_code() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    let mut session = FakeSession::new(&recorder);
    session.logged_in = true;

    let mut controller = Controller::start(session, config());
    assert_eq!(controller.line().await.as_deref(), Some(SESSION_ID));

    let event = controller.event().await;
    assert_eq!(event["event"], "ok");
    assert_eq!(controller.expect("chat").await["args"][0]["id"], "1@c.us");
    controller.expect("chat").await;

    controller
        .send(r#"{"command": "send", "args": ["1@c.us", "hello"]}"#)
        .await;
    controller.finish().await?;
    assert_eq!(recorder.calls("qr"), ["qr", "/qr"]);
    assert_eq!(recorder.calls("login"), ["login", "/login"]);
    assert_eq!(recorder.calls("send:hello").len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_connect_over_tcp() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let mut bridge = Bridge::new(FakeSession::new(&recorder), config());
    let shutdown = bridge.shutdown_token();
    let task = tokio::spawn(async move {
        let result = bridge.connect(addr).await;
        result.map(|_| bridge.state())
    });

    let (stream, _) = timeout(WAIT, listener.accept()).await??;
    let mut lines = BufReader::new(stream).lines();
    assert_eq!(lines.next_line().await?.as_deref(), Some(SESSION_ID));
    let event: Value = serde_json::from_str(&lines.next_line().await?.unwrap())?;
    assert_eq!(event["event"], "qr");

    shutdown.cancel();
    assert_eq!(timeout(WAIT, task).await???, BridgeState::Terminated);
    Ok(())
}

#[tokio::test]
async fn test_inline_media_failure_is_reported() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    recorder.add_blob(BLOB_URL, blob());
    recorder.queue_unread(vec![group(vec![
        media("good", 1.0, BLOB_URL),
        media("bad", 2.0, "https://mmg.example/expired"),
    ])]);

    let mut controller = Controller::start(FakeSession::new(&recorder), config());
    controller.handshake().await;

    let error = controller.event().await;
    assert_eq!(error["event"], "error");
    assert_eq!(error["args"][0]["kind"], "network");
    assert_eq!(error["args"][0]["id"], "bad");

    let event = controller.expect("unread-messages").await;
    let messages = &event["args"][0]["messages"];
    assert_eq!(messages[0]["isMedia"], true);
    assert_eq!(messages[0]["body"], PLAINTEXT);
    assert_eq!(messages[0]["caption"], "look");
    assert_eq!(messages[1]["id"], "bad");
    assert!(messages[1]["body"].is_null());

    controller.finish().await?;
    Ok(())
}

#[tokio::test]
async fn test_inline_media_disabled() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    recorder.queue_unread(vec![group(vec![media("m", 1.0, BLOB_URL)])]);

    let config = BridgeConfig {
        inline_media: false,
        include_me: false,
        include_notifications: true,
        ..config()
    };
    let mut controller = Controller::start(FakeSession::new(&recorder), config);
    controller.handshake().await;

    let event = controller.expect("unread-messages").await;
    assert!(event["args"][0]["messages"][0]["body"].is_null());
    assert_eq!(
        event["args"][0]["messages"][0]["media"]["sourceUrl"],
        BLOB_URL
    );

    controller.finish().await?;
    assert!(recorder.calls("fetch:").is_empty());
    assert!(!recorder.calls("unread:false:true").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_shutdown_cancels_login_code_request() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    let mut session = FakeSession::new(&recorder);
    session.block_qr = true;

    let mut controller = Controller::start(session, config());
    assert_eq!(controller.line().await.as_deref(), Some(SESSION_ID));
    wait_until(|| recorder.qr_running.load(Ordering::SeqCst)).await;

    controller.shutdown.cancel();
    timeout(WAIT, &mut controller.task).await???;

    assert!(!recorder.qr_running.load(Ordering::SeqCst));
    assert_eq!(recorder.calls("qr"), ["qr", "/qr"]);
    assert_eq!(controller.line().await, None);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_request_leaves_no_task() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    let mut session = FakeSession::new(&recorder);
    session.block_qr = true;
    let lock = SessionLock::new(session);

    let request = LoginCodeRequest::spawn(&lock).await;
    wait_until(|| recorder.qr_running.load(Ordering::SeqCst)).await;
    assert!(lock.try_lock().is_none());

    request.cancel().await?;
    assert!(!recorder.qr_running.load(Ordering::SeqCst));
    assert!(lock.try_lock().is_some());

    // Dropping without awaiting also stops the task.
    let request = LoginCodeRequest::spawn(&lock).await;
    wait_until(|| recorder.qr_running.load(Ordering::SeqCst)).await;
    drop(request);
    wait_until(|| !recorder.qr_running.load(Ordering::SeqCst)).await;
    let _session = timeout(WAIT, lock.lock()).await?;
    Ok(())
}

#[tokio::test]
async fn test_login_code_request_result() -> Result<(), Box<dyn Error>> {
    let recorder = Arc::new(Recorder::default());
    let lock = SessionLock::new(FakeSession::new(&recorder));

    let mut request = LoginCodeRequest::spawn(&lock).await;
    assert_eq!(request.wait().await?, QR_CODE);
    assert!(request.is_finished());
    Ok(())
}
