//! In-memory collaborators for tests.

use async_trait::async_trait;
use monitor_core::{
    Error, Result,
    logs::{Archive, LogSink},
    models::{Check, CheckState, Collection, HttpMethod, LastChecked, Protocol},
    notify::Notifier,
    store::RecordStore,
};
use serde_json::{Value, json};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::Semaphore;

use crate::probe::{ProbeRequest, Transport};

pub const CHECK_ID: &str = "abcdefghijklmnopqrstuv";
pub const OWNER: &str = "5551234567";

pub fn check() -> Check {
    Check {
        id: CHECK_ID.to_string(),
        owner_id: OWNER.to_string(),
        protocol: Protocol::Https,
        url: "example.com".to_string(),
        method: HttpMethod::Get,
        success_codes: BTreeSet::from([200]),
        timeout_seconds: 2,
        state: CheckState::Down,
        last_checked: LastChecked::Never,
    }
}

/// A stored check record with a 22 character id derived from `tag`.
pub fn raw_check(tag: &str, url: &str) -> (String, Value) {
    let id = format!("{tag:x<22}");
    let value = json!({
        "id": id,
        "userPhone": OWNER,
        "protocol": "https",
        "url": url,
        "method": "get",
        "successCodes": [200],
        "timeoutSeconds": 2,
    });
    (id, value)
}

#[derive(Clone)]
pub enum FakeReply {
    Status(u16),
    Fail(String),
    Delayed(Duration, u16),
    /// Answers once a permit is added to the semaphore.
    Gated(Arc<Semaphore>, u16),
}

pub struct FakeTransport {
    default: FakeReply,
    by_host: Mutex<HashMap<String, FakeReply>>,
    requests: Mutex<Vec<ProbeRequest>>,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl FakeTransport {
    pub fn new(default: FakeReply) -> Self {
        Self {
            default,
            by_host: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn reply_for(&self, host: &str, reply: FakeReply) {
        self.by_host.lock().unwrap().insert(host.to_string(), reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProbeRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &ProbeRequest) -> std::result::Result<u16, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let host = request.url.host_str().unwrap_or_default().to_string();
        let reply = self
            .by_host
            .lock()
            .unwrap()
            .get(&host)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        let result = match reply {
            FakeReply::Status(code) => Ok(code),
            FakeReply::Fail(detail) => Err(detail),
            FakeReply::Delayed(delay, code) => {
                tokio::time::sleep(delay).await;
                Ok(code)
            }
            FakeReply::Gated(gate, code) => {
                let _permit = gate.acquire().await.map_err(|e| e.to_string())?;
                Ok(code)
            }
        };
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(Collection, String), Value>>,
    updates: AtomicUsize,
    pub fail_list: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_read: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn with_checks(checks: impl IntoIterator<Item = (String, Value)>) -> Self {
        let store = Self::default();
        {
            let mut records = store.records.lock().unwrap();
            for (key, value) in checks {
                records.insert((Collection::Checks, key), value);
            }
        }
        store
    }

    pub fn check(&self, key: &str) -> Option<Value> {
        self.records
            .lock()
            .unwrap()
            .get(&(Collection::Checks, key.to_string()))
            .cloned()
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, collection: Collection, key: &str, record: &Value) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let slot = (collection, key.to_string());
        if records.contains_key(&slot) {
            return Err(Error::store(format!("{collection}/{key} already exists")));
        }
        records.insert(slot, record.clone());
        Ok(())
    }

    async fn read(&self, collection: Collection, key: &str) -> Result<Value> {
        if self.fail_read.lock().unwrap().contains(key) {
            return Err(Error::store(format!("could not read {collection}/{key}")));
        }
        self.records
            .lock()
            .unwrap()
            .get(&(collection, key.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("{collection}/{key}")))
    }

    async fn update(&self, collection: Collection, key: &str, record: &Value) -> Result<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(Error::store("disk full"));
        }
        let mut records = self.records.lock().unwrap();
        let slot = (collection, key.to_string());
        if !records.contains_key(&slot) {
            return Err(Error::store(format!("{collection}/{key} does not exist")));
        }
        records.insert(slot, record.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .remove(&(collection, key.to_string()))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("{collection}/{key}")))
    }

    async fn list(&self, collection: Collection) -> Result<Vec<String>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::enumeration("storage unavailable"));
        }
        let mut keys: Vec<String> = self
            .records
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| *c == collection)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[derive(Default)]
pub struct MemoryLogSink {
    logs: Mutex<BTreeMap<String, Vec<String>>>,
    archives: Mutex<BTreeMap<String, String>>,
    pub fail_append: AtomicBool,
    pub fail_list: AtomicBool,
    pub fail_compress: Mutex<HashSet<String>>,
}

impl MemoryLogSink {
    pub fn lines(&self, name: &str) -> Vec<String> {
        self.logs.lock().unwrap().get(name).cloned().unwrap_or_default()
    }

    pub fn archives(&self) -> BTreeMap<String, String> {
        self.archives.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn append(&self, name: &str, line: &str) -> Result<()> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(Error::log_sink("log volume unavailable"));
        }
        self.logs
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(line.to_string());
        Ok(())
    }

    async fn list(&self, include_compressed: bool) -> Result<Vec<String>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::log_sink("could not list logs"));
        }
        let mut names: Vec<String> = self.logs.lock().unwrap().keys().cloned().collect();
        if include_compressed {
            names.extend(self.archives.lock().unwrap().keys().cloned());
        }
        names.sort();
        Ok(names)
    }

    async fn compress(&self, name: &str, new_name: &str) -> Result<Archive> {
        if self.fail_compress.lock().unwrap().contains(name) {
            return Err(Error::log_sink(format!("could not compress {name}")));
        }
        let lines = self
            .logs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::log_sink(format!("no log {name}")))?;
        if lines.is_empty() {
            return Ok(Archive::Empty);
        }

        let mut archives = self.archives.lock().unwrap();
        if archives.contains_key(new_name) {
            return Err(Error::log_sink(format!("archive {new_name} exists")));
        }
        let mut text = lines.join("\n");
        text.push('\n');
        archives.insert(new_name.to_string(), text);
        Ok(Archive::Written)
    }

    async fn decompress(&self, name: &str) -> Result<String> {
        self.archives
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("archive {name}")))
    }

    async fn truncate(&self, name: &str) -> Result<()> {
        self.logs
            .lock()
            .unwrap()
            .get_mut(name)
            .map(Vec::clear)
            .ok_or_else(|| Error::log_sink(format!("no log {name}")))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
    /// Never answers, like a provider that accepts the connection and stalls.
    pub hang: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, message: &str) -> Result<()> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::notification("provider rejected the message"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_string()));
        Ok(())
    }
}
