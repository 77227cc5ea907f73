//! In-memory fakes for the cleaner's ports.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    cleaner::store::FileStore,
    config::Config,
    domain::{ChatId, MessageId, MessageRef, Operator, UserId},
    errors::Error,
    messaging::{
        port::{InboundPort, MessagingPort},
        types::{MessagingCapabilities, TextMessage},
    },
    Result,
};

pub fn test_config(root: &str) -> Config {
    let root = PathBuf::from(root);
    Config {
        bot_token: "x".to_string(),
        operator: Operator::private(7),
        document_path: root.join("bot.py"),
        changelog_path: root.join("changelog.md"),
        backup_dir: root.join("backups"),
        confirm_timeout: Duration::from_secs(60),
    }
}

pub fn msg_from(user_id: i64, text: &str) -> TextMessage {
    TextMessage {
        chat_id: ChatId(user_id),
        user_id: UserId(user_id),
        username: None,
        text: text.to_string(),
    }
}

#[derive(Clone, Debug)]
pub struct Sent {
    pub chat_id: ChatId,
    pub html: String,
    pub listener_active_at_send: bool,
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI32,
    fail: bool,
    delay: Duration,
    listening: Option<Arc<AtomicBool>>,
}

impl RecordingMessenger {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every send takes `delay`, like a flood-control back-off.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Record whether the given listener was active at each send.
    pub fn watching(listening: Arc<AtomicBool>) -> Self {
        Self {
            listening: Some(listening),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(Error::Messaging("chat unreachable".to_string()));
        }
        let listener_active_at_send = self
            .listening
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst));
        self.sent.lock().unwrap().push(Sent {
            chat_id,
            html: html.to_string(),
            listener_active_at_send,
        });
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        })
    }
}

/// Inbound port that replays messages at fixed offsets from `listen()` start.
#[derive(Default)]
pub struct ScriptedInbound {
    script: Vec<(Duration, TextMessage)>,
    fail: bool,
    listening: Arc<AtomicBool>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    delivered: AtomicUsize,
}

impl ScriptedInbound {
    pub fn new(script: Vec<(Duration, TextMessage)>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// A listener that dies immediately.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn listening_flag(&self) -> Arc<AtomicBool> {
        self.listening.clone()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InboundPort for ScriptedInbound {
    async fn listen(
        &self,
        sink: mpsc::Sender<TextMessage>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Messaging("polling failed".to_string()));
        }
        self.listening.store(true, Ordering::SeqCst);

        let started = Instant::now();
        for (at, msg) in &self.script {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(started + *at) => {
                    if sink.send(msg.clone()).await.is_err() {
                        break;
                    }
                    self.delivered.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        cancel.cancelled().await;

        self.listening.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Read,
    Write,
    Append,
    CreateNew,
}

/// In-memory [`FileStore`] with per-operation fault injection.
#[derive(Default)]
pub struct MemStore {
    files: Mutex<HashMap<PathBuf, String>>,
    failures: Mutex<Vec<(StoreOp, PathBuf)>>,
}

impl MemStore {
    pub fn insert(&self, path: &Path, contents: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_string());
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Make `op` fail for `path` and everything below it.
    pub fn fail(&self, op: StoreOp, path: impl AsRef<Path>) {
        self.failures
            .lock()
            .unwrap()
            .push((op, path.as_ref().to_path_buf()));
    }

    fn check(&self, op: StoreOp, path: &Path) -> io::Result<()> {
        let failing = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|(o, p)| *o == op && path.starts_with(p));
        if failing {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected {op:?} failure"),
            ));
        }
        Ok(())
    }
}

impl FileStore for MemStore {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.check(StoreOp::Read, path)?;
        self.get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.check(StoreOp::Write, path)?;
        self.insert(path, contents);
        Ok(())
    }

    fn append(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.check(StoreOp::Append, path)?;
        self.files
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default()
            .push_str(contents);
        Ok(())
    }

    fn create_new(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.check(StoreOp::CreateNew, path)?;
        let mut files = self.files.lock().unwrap();
        if files.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exists"));
        }
        files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}
