//! In-process fakes for the external seams, plus a harness that wires them
//! into an `AppState` backed by `MemoryStore`.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use axum::async_trait;
use bytes::Bytes;

use crate::access::Caller;
use crate::auth::password::hash_password;
use crate::auth::JwtKeys;
use crate::classifier::{Classifier, Prediction};
use crate::config::{AppConfig, ClassifierConfig, JwtConfig, StorageConfig, StoreConfig};
use crate::mail::{Email, MailError, Mailer};
use crate::results::repo_types::Verdict;
use crate::state::AppState;
use crate::storage::StorageClient;
use crate::store::{MemoryStore, Store};
use crate::users::repo_types::{NewUser, Role, User};

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        store: StoreConfig::Memory,
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
            ttl_minutes: 5,
            refresh_ttl_minutes: 60,
        },
        storage: StorageConfig::Local {
            root: PathBuf::from("unused"),
            public_base: "/uploads".into(),
        },
        classifier: ClassifierConfig {
            url: "http://classifier.invalid/predict".into(),
            timeout_secs: 5,
        },
        smtp: None,
        otp_ttl_minutes: 10,
        max_upload_bytes: 1024 * 1024,
        admin: None,
    }
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Bytes>>,
    attempts: AtomicUsize,
    fail_at: AtomicUsize,
}

impl FakeStorage {
    /// The `n`th put (1-based) fails.
    pub fn fail_on_put(&self, n: usize) {
        self.fail_at.store(n, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn put_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, _ct: &str) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == self.fail_at.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn presign_get(&self, key: &str, _seconds: u64) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{key}"))
    }
}

enum Script {
    Answer(Prediction),
    Fail(String),
    Hang,
}

/// Replies from a queue; an empty queue answers `NON CANCER` at 0.5.
#[derive(Default)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn push(&self, label: Verdict, confidence: f64) {
        self.script
            .lock()
            .unwrap()
            .push_back(Script::Answer(Prediction { label, confidence }));
    }

    pub fn push_error(&self, msg: &str) {
        self.script.lock().unwrap().push_back(Script::Fail(msg.into()));
    }

    pub fn push_hang(&self) {
        self.script.lock().unwrap().push_back(Script::Hang);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn predict(&self, _image: Bytes, _ct: &str) -> anyhow::Result<Prediction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Answer(p)) => Ok(p),
            Some(Script::Fail(msg)) => Err(anyhow!(msg)),
            Some(Script::Hang) => std::future::pending().await,
            None => Ok(Prediction {
                label: Verdict::NonCancer,
                confidence: 0.5,
            }),
        }
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    fail: bool,
}

impl RecordingMailer {
    /// Records every message but reports delivery failure.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }

    /// Waits until at least `n` messages were handed over by background sends.
    pub async fn wait_for(&self, n: usize) {
        for _ in 0..200 {
            if self.sent.lock().unwrap().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {n} mails, got {}", self.sent.lock().unwrap().len());
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        if email.to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        if let Some(bad) = email.envelope_recipients().into_iter().find(|a| !a.contains('@')) {
            return Err(MailError::Address(bad));
        }
        self.sent.lock().unwrap().push(email);
        if self.fail {
            return Err(MailError::Delivery("connection refused".into()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub storage: Arc<FakeStorage>,
    pub classifier: Arc<ScriptedClassifier>,
    pub mailer: Arc<RecordingMailer>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(FakeStorage::default());
        let classifier = Arc::new(ScriptedClassifier::default());
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState {
            store: store.clone(),
            config: Arc::new(test_config()),
            storage: storage.clone(),
            classifier: classifier.clone(),
            mailer: mailer.clone(),
        };
        Self {
            state,
            store,
            storage,
            classifier,
            mailer,
        }
    }

    /// Inserts a verified account with password `password123`.
    pub async fn user(&self, role: Role) -> User {
        let id = uuid::Uuid::new_v4();
        self.store
            .insert_user(NewUser {
                name: format!("{} {}", role.as_str(), &id.simple().to_string()[..6]),
                email: format!("{}@example.com", id.simple()),
                password_hash: hash_password("password123").unwrap(),
                role,
                otp_code: None,
                otp_expires_at: None,
                otp_verified: true,
            })
            .await
            .unwrap()
    }

    pub async fn caller(&self, role: Role) -> Caller {
        let user = self.user(role).await;
        Caller {
            id: user.id,
            role: user.role,
        }
    }

    /// A verified account and a bearer header value for it.
    pub async fn login(&self, role: Role) -> (User, String) {
        let user = self.user(role).await;
        let token = JwtKeys::from(&self.state.config.jwt).sign_access(&user).unwrap();
        (user, format!("Bearer {token}"))
    }
}
