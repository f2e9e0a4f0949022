//! In-memory backend used by the integration tests.
//!
//! Every connection reports into a shared [`FakeState`] so tests can check
//! how many connections were opened and closed, and what was submitted.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlgate::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How cached connections answer the liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PingMode {
    Healthy = 0,
    Broken = 1,
    /// Every other probe fails
    Flaky = 2,
}

/// Counters and recordings shared by a factory and its connections
#[derive(Debug, Default)]
pub struct FakeState {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub pings: AtomicUsize,
    pub queries: AtomicUsize,
    ping_mode: AtomicU8,
    refuse: AtomicBool,
    last_sql: Mutex<Option<String>>,
    last_descriptor: Mutex<Option<String>>,
    last_args: Mutex<Option<BoundArgs>>,
}

impl FakeState {
    pub fn set_ping(&self, mode: PingMode) {
        self.ping_mode.store(mode as u8, Ordering::SeqCst);
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn last_sql(&self) -> Option<String> {
        self.last_sql.lock().unwrap().clone()
    }

    pub fn last_descriptor(&self) -> Option<String> {
        self.last_descriptor.lock().unwrap().clone()
    }

    pub fn last_args(&self) -> Option<BoundArgs> {
        self.last_args.lock().unwrap().clone()
    }

    fn probe_passes(&self) -> bool {
        let n = self.pings.fetch_add(1, Ordering::SeqCst);
        match self.ping_mode.load(Ordering::SeqCst) {
            0 => true,
            1 => false,
            _ => n % 2 == 0,
        }
    }
}

type Responder =
    Arc<dyn Fn(&str, &BoundArgs) -> Result<Option<Box<dyn RowCursor>>> + Send + Sync>;

/// Cursor with one `version` column and one row
pub fn version_cursor() -> Box<dyn RowCursor> {
    Box::new(VecCursor::from_values(
        vec!["version".into()],
        vec![vec![DriverValue::Text("fake 1.0".into())]],
    ))
}

/// Factory handing out [`FakeConnection`]s
pub struct FakeFactory {
    state: Arc<FakeState>,
    responder: Responder,
    connect_delay: Option<Duration>,
    query_delay: Option<Duration>,
    database: DatabaseType,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState::default()),
            responder: Arc::new(|_, _| Ok(Some(version_cursor()))),
            connect_delay: None,
            query_delay: None,
            database: DatabaseType::Postgres,
        }
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str, &BoundArgs) -> Result<Option<Box<dyn RowCursor>>> + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Every query waits this long before it looks at the connection
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = Some(delay);
        self
    }

    pub fn with_database(mut self, database: DatabaseType) -> Self {
        self.database = database;
        self
    }

    pub fn state(&self) -> Arc<FakeState> {
        Arc::clone(&self.state)
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn connect(&self, descriptor: &str) -> Result<Arc<dyn Connection>> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(Error::refused(format!("{descriptor}: connection refused")));
        }
        if descriptor.is_empty() {
            return Err(Error::descriptor("empty descriptor"));
        }

        self.state.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            state: Arc::clone(&self.state),
            responder: Arc::clone(&self.responder),
            descriptor: descriptor.to_string(),
            query_delay: self.query_delay,
            closed: AtomicBool::new(false),
        }))
    }

    fn database_type(&self) -> DatabaseType {
        self.database
    }
}

/// Connection whose behavior is driven by [`FakeState`]
pub struct FakeConnection {
    state: Arc<FakeState>,
    responder: Responder,
    descriptor: String,
    query_delay: Option<Duration>,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn ping(&self) -> Result<()> {
        tokio::task::yield_now().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::connection("connection is closed"));
        }
        if self.state.probe_passes() {
            Ok(())
        } else {
            Err(Error::connection("server closed the connection unexpectedly"))
        }
    }

    async fn query(&self, sql: &str, args: &BoundArgs) -> Result<Option<Box<dyn RowCursor>>> {
        match self.query_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::connection("connection is closed"));
        }
        self.state.queries.fetch_add(1, Ordering::SeqCst);
        *self.state.last_sql.lock().unwrap() = Some(sql.to_string());
        *self.state.last_descriptor.lock().unwrap() = Some(self.descriptor.clone());
        *self.state.last_args.lock().unwrap() = Some(args.clone());
        (self.responder)(sql, args)
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
