//! Connection pool.
//!
//! All pool bookkeeping lives in one [`PoolState`] behind a single mutex.
//! Acquisition walks a fixed decision tree under that lock:
//!
//! 1. take the head of the idle list, else
//! 2. open a new physical connection while below `max_active`, else
//! 3. reclaim the oldest active connection if it has been checked out for
//!    longer than `max_checkout_time`, else
//! 4. wait on the condition variable for up to `time_to_wait` and start over.
//!
//! Every candidate is validated before it is handed out. Releases return
//! the physical connection to the idle list under a fresh handle (or close
//! it when the idle list is full) and wake one waiter.
//!
//! A reclaimed overdue connection keeps its physical connection: the old
//! handle is invalidated so its borrower can no longer reach it, any open
//! transaction is rolled back, and the connection continues under a new
//! handle.

use crate::config::{
    DEFAULT_BAD_CONNECTION_TOLERANCE, DEFAULT_MAX_ACTIVE, DEFAULT_MAX_CHECKOUT_TIME_MS,
    DEFAULT_MAX_IDLE, DEFAULT_PING_NOT_USED_FOR_MS, DEFAULT_TIME_TO_WAIT_MS,
};
use crate::datasource::DataSource;
use crate::datasource::unpooled::UnpooledDataSource;
use crate::driver::{
    Connection, Credentials, IsolationLevel, PreparedCommand, ResultSet, UpdateOutcome,
};
use crate::error::{MapperError, MapperResult};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pool sizing and validation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_active: usize,
    pub max_idle: usize,
    /// Checkout duration after which an active connection may be reclaimed.
    pub max_checkout_time: Duration,
    /// How long an acquiring thread waits before re-running the decision tree.
    pub time_to_wait: Duration,
    pub ping_enabled: bool,
    /// Query used as liveness probe; `None` uses the driver's native ping.
    pub ping_query: Option<String>,
    /// Ping only connections idle for longer than this; zero pings every time.
    pub ping_connections_not_used_for: Duration,
    /// Bad connections tolerated beyond `max_idle` before acquisition fails.
    pub bad_connection_tolerance: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_active: DEFAULT_MAX_ACTIVE,
            max_idle: DEFAULT_MAX_IDLE,
            max_checkout_time: Duration::from_millis(DEFAULT_MAX_CHECKOUT_TIME_MS),
            time_to_wait: Duration::from_millis(DEFAULT_TIME_TO_WAIT_MS),
            ping_enabled: false,
            ping_query: None,
            ping_connections_not_used_for: Duration::from_millis(DEFAULT_PING_NOT_USED_FOR_MS),
            bad_connection_tolerance: DEFAULT_BAD_CONNECTION_TOLERANCE,
        }
    }
}

/// Pool bookkeeping for one physical connection.
struct PooledConnection {
    handle_id: u64,
    real: Arc<Mutex<Box<dyn Connection>>>,
    real_id: u64,
    valid: Arc<AtomicBool>,
    type_code: u64,
    created_at: Instant,
    last_used_at: Instant,
    checkout_at: Instant,
}

impl PooledConnection {
    fn new(handle_id: u64, real: Box<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            handle_id,
            real_id: real.id(),
            real: Arc::new(Mutex::new(real)),
            valid: Arc::new(AtomicBool::new(true)),
            type_code: 0,
            created_at: now,
            last_used_at: now,
            checkout_at: now,
        }
    }

    /// New handle for the same physical connection.
    fn rewrap(&self, handle_id: u64) -> Self {
        Self {
            handle_id,
            real: self.real.clone(),
            real_id: self.real_id,
            valid: Arc::new(AtomicBool::new(true)),
            type_code: self.type_code,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
            checkout_at: self.checkout_at,
        }
    }

    fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    fn is_flag_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn checkout_time(&self) -> Duration {
        self.checkout_at.elapsed()
    }

    fn time_since_last_use(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    /// Roll back if not auto-committing, then restore `auto_commit`.
    /// Returns false if either failed.
    fn reset(&self, auto_commit: bool) -> bool {
        let mut real = self.real.lock();
        let result = real.auto_commit().and_then(|current| {
            if !current {
                real.rollback()?;
            }
            if current != auto_commit {
                real.set_auto_commit(auto_commit)?;
            }
            Ok(())
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(connection = self.real_id, error = %e, "Reset of pooled connection failed");
                false
            }
        }
    }

    fn close_physical(&self) {
        let mut real = self.real.lock();
        if !real.auto_commit().unwrap_or(true) {
            let _ = real.rollback();
        }
        if let Err(e) = real.close() {
            debug!(connection = self.real_id, error = %e, "Error closing pooled connection");
        }
    }
}

#[derive(Debug, Default)]
struct PoolCounters {
    request_count: u64,
    accumulated_request_time: Duration,
    accumulated_checkout_time: Duration,
    claimed_overdue_connection_count: u64,
    accumulated_checkout_time_of_overdue_connections: Duration,
    accumulated_wait_time: Duration,
    had_to_wait_count: u64,
    bad_connection_count: u64,
}

struct PoolState {
    idle: VecDeque<PooledConnection>,
    /// Ordered by checkout; the head is the oldest.
    active: Vec<PooledConnection>,
    expected_type_code: u64,
    counters: PoolCounters,
}

struct PoolInner {
    source: RwLock<UnpooledDataSource>,
    settings: PoolSettings,
    state: Mutex<PoolState>,
    available: Condvar,
    next_handle_id: AtomicU64,
}

fn type_code(url: &str, credentials: &Credentials) -> u64 {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    credentials.username.hash(&mut hasher);
    credentials.password.hash(&mut hasher);
    hasher.finish()
}

fn average(total: Duration, count: u64) -> u64 {
    if count == 0 {
        0
    } else {
        (total.as_millis() / u128::from(count)) as u64
    }
}

impl PoolInner {
    fn next_handle_id(&self) -> u64 {
        self.next_handle_id.fetch_add(1, Ordering::Relaxed)
    }

    fn expected_type_code(&self) -> u64 {
        let source = self.source.read();
        type_code(source.url(), source.credentials())
    }

    /// Liveness check: closed connections fail; idle ones may be pinged.
    fn ping(&self, conn: &PooledConnection) -> bool {
        let mut real = conn.real.lock();
        if real.is_closed() {
            debug!(connection = conn.real_id, "Connection is closed");
            return false;
        }
        let not_used_for = self.settings.ping_connections_not_used_for;
        if !self.settings.ping_enabled
            || (!not_used_for.is_zero() && conn.time_since_last_use() <= not_used_for)
        {
            return true;
        }
        debug!(connection = conn.real_id, "Testing connection");
        let result = real.ping(self.settings.ping_query.as_deref()).and_then(|_| {
            if real.auto_commit()? {
                Ok(())
            } else {
                real.rollback()
            }
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(connection = conn.real_id, error = %e, "Ping of connection failed");
                if let Err(close_err) = real.close() {
                    debug!(connection = conn.real_id, error = %close_err, "Error closing bad connection");
                }
                false
            }
        }
    }

    fn is_valid(&self, conn: &PooledConnection) -> bool {
        conn.is_flag_valid() && self.ping(conn)
    }

    fn pop_connection(self: &Arc<Self>, credentials: &Credentials) -> MapperResult<PooledConnectionHandle> {
        let start = Instant::now();
        let mut counted_wait = false;
        let mut local_bad_connection_count = 0usize;
        let mut state = self.state.lock();

        loop {
            let candidate = if let Some(conn) = state.idle.pop_front() {
                debug!(connection = conn.real_id, "Checked out connection from pool");
                conn
            } else if state.active.len() < self.settings.max_active {
                let real = self.source.read().open(credentials)?;
                let conn = PooledConnection::new(self.next_handle_id(), real);
                info!(connection = conn.real_id, "Created connection");
                conn
            } else {
                let longest_checkout = state
                    .active
                    .first()
                    .map(PooledConnection::checkout_time)
                    .unwrap_or_default();
                if longest_checkout > self.settings.max_checkout_time {
                    let oldest = state.active.remove(0);
                    let counters = &mut state.counters;
                    counters.claimed_overdue_connection_count += 1;
                    counters.accumulated_checkout_time_of_overdue_connections += longest_checkout;
                    counters.accumulated_checkout_time += longest_checkout;
                    oldest.reset(self.source.read().default_auto_commit());
                    let fresh = oldest.rewrap(self.next_handle_id());
                    oldest.invalidate();
                    warn!(
                        connection = fresh.real_id,
                        checkout_ms = longest_checkout.as_millis() as u64,
                        "Claimed overdue connection"
                    );
                    self.available.notify_one();
                    fresh
                } else {
                    if !counted_wait {
                        state.counters.had_to_wait_count += 1;
                        counted_wait = true;
                    }
                    debug!(
                        wait_ms = self.settings.time_to_wait.as_millis() as u64,
                        "Waiting for a connection"
                    );
                    let wait_start = Instant::now();
                    self.available
                        .wait_for(&mut state, self.settings.time_to_wait);
                    state.counters.accumulated_wait_time += wait_start.elapsed();
                    continue;
                }
            };

            if self.is_valid(&candidate)
                && candidate.reset(self.source.read().default_auto_commit())
            {
                let mut candidate = candidate;
                let now = Instant::now();
                candidate.type_code = type_code(self.source.read().url(), credentials);
                candidate.checkout_at = now;
                candidate.last_used_at = now;
                let handle = PooledConnectionHandle::new(self.clone(), &candidate);
                state.active.push(candidate);
                state.counters.request_count += 1;
                state.counters.accumulated_request_time += start.elapsed();
                return Ok(handle);
            }

            debug!(
                connection = candidate.real_id,
                "A bad connection was returned from the pool, getting another connection"
            );
            candidate.invalidate();
            state.counters.bad_connection_count += 1;
            local_bad_connection_count += 1;
            if local_bad_connection_count
                > self.settings.max_idle + self.settings.bad_connection_tolerance
            {
                debug!("Could not get a good connection to the database");
                return Err(MapperError::connection(
                    "PooledDataSource: Could not get a good connection to the database.",
                    "Check that the database is reachable and the ping query is valid",
                ));
            }
        }
    }

    fn push_connection(&self, handle_id: u64) {
        let mut state = self.state.lock();
        let Some(position) = state.active.iter().position(|c| c.handle_id == handle_id) else {
            debug!(handle = handle_id, "Connection was already reclaimed; nothing to return");
            return;
        };
        let conn = state.active.remove(position);

        if self.is_valid(&conn) {
            state.counters.accumulated_checkout_time += conn.checkout_time();
            let reusable = state.idle.len() < self.settings.max_idle
                && conn.type_code == state.expected_type_code;
            if reusable && conn.reset(self.source.read().default_auto_commit()) {
                let mut fresh = conn.rewrap(self.next_handle_id());
                fresh.last_used_at = Instant::now();
                conn.invalidate();
                debug!(connection = fresh.real_id, "Returned connection to pool");
                state.idle.push_back(fresh);
            } else {
                conn.close_physical();
                conn.invalidate();
                debug!(connection = conn.real_id, "Closed connection");
            }
        } else {
            debug!(
                connection = conn.real_id,
                "A bad connection attempted to return to the pool, discarding"
            );
            conn.invalidate();
            state.counters.bad_connection_count += 1;
        }
        self.available.notify_one();
    }

    fn force_close_all(&self) {
        let mut state = self.state.lock();
        state.expected_type_code = self.expected_type_code();
        let active: Vec<PooledConnection> = state.active.drain(..).collect();
        let idle: Vec<PooledConnection> = state.idle.drain(..).collect();
        for conn in active.into_iter().chain(idle) {
            conn.invalidate();
            conn.close_physical();
        }
        info!("PooledDataSource forcefully closed/removed all connections");
        self.available.notify_all();
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for conn in state.idle.drain(..) {
            conn.close_physical();
        }
    }
}

/// Snapshot of the pool's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub active_connections: usize,
    pub idle_connections: usize,
    pub max_active: usize,
    pub max_idle: usize,
    pub request_count: u64,
    pub average_request_time_ms: u64,
    pub average_wait_time_ms: u64,
    pub had_to_wait_count: u64,
    pub bad_connection_count: u64,
    pub claimed_overdue_connection_count: u64,
    pub average_overdue_checkout_time_ms: u64,
    pub average_checkout_time_ms: u64,
}

/// Bounded pool of connections over an [`UnpooledDataSource`].
#[derive(Clone)]
pub struct PooledDataSource {
    inner: Arc<PoolInner>,
}

impl PooledDataSource {
    pub fn new(source: UnpooledDataSource, settings: PoolSettings) -> Self {
        let expected_type_code = type_code(source.url(), source.credentials());
        Self {
            inner: Arc::new(PoolInner {
                source: RwLock::new(source),
                settings,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    active: Vec::new(),
                    expected_type_code,
                    counters: PoolCounters::default(),
                }),
                available: Condvar::new(),
                next_handle_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.inner.settings
    }

    /// Lease a connection with the configured credentials.
    pub fn acquire(&self) -> MapperResult<PooledConnectionHandle> {
        let credentials = self.inner.source.read().credentials().clone();
        self.inner.pop_connection(&credentials)
    }

    /// Lease a connection with explicit credentials.
    pub fn acquire_as(&self, credentials: &Credentials) -> MapperResult<PooledConnectionHandle> {
        self.inner.pop_connection(credentials)
    }

    /// Return a lease; same as closing or dropping the handle.
    pub fn release(&self, mut handle: PooledConnectionHandle) {
        handle.release();
    }

    /// Invalidate and close every active and idle connection.
    pub fn force_close_all(&self) {
        self.inner.force_close_all();
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.inner.source.write().set_url(url);
        self.force_close_all();
    }

    pub fn set_credentials(&self, credentials: Credentials) {
        self.inner.source.write().set_credentials(credentials);
        self.force_close_all();
    }

    pub fn set_username(&self, username: Option<String>) {
        let mut credentials = self.inner.source.read().credentials().clone();
        credentials.username = username;
        self.set_credentials(credentials);
    }

    pub fn set_password(&self, password: Option<String>) {
        let mut credentials = self.inner.source.read().credentials().clone();
        credentials.password = password;
        self.set_credentials(credentials);
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        let c = &state.counters;
        PoolStatus {
            active_connections: state.active.len(),
            idle_connections: state.idle.len(),
            max_active: self.inner.settings.max_active,
            max_idle: self.inner.settings.max_idle,
            request_count: c.request_count,
            average_request_time_ms: average(c.accumulated_request_time, c.request_count),
            average_wait_time_ms: average(c.accumulated_wait_time, c.had_to_wait_count),
            had_to_wait_count: c.had_to_wait_count,
            bad_connection_count: c.bad_connection_count,
            claimed_overdue_connection_count: c.claimed_overdue_connection_count,
            average_overdue_checkout_time_ms: average(
                c.accumulated_checkout_time_of_overdue_connections,
                c.claimed_overdue_connection_count,
            ),
            average_checkout_time_ms: average(c.accumulated_checkout_time, c.request_count),
        }
    }
}

impl fmt::Debug for PooledDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledDataSource")
            .field("url", &self.inner.source.read().url())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl DataSource for PooledDataSource {
    fn connection(&self) -> MapperResult<Box<dyn Connection>> {
        Ok(Box::new(self.acquire()?))
    }

    fn connection_as(&self, credentials: &Credentials) -> MapperResult<Box<dyn Connection>> {
        Ok(Box::new(self.acquire_as(credentials)?))
    }
}

/// A leased connection. Closing or dropping it returns it to the pool.
pub struct PooledConnectionHandle {
    pool: Arc<PoolInner>,
    handle_id: u64,
    real: Arc<Mutex<Box<dyn Connection>>>,
    real_id: u64,
    valid: Arc<AtomicBool>,
    released: bool,
}

impl PooledConnectionHandle {
    fn new(pool: Arc<PoolInner>, conn: &PooledConnection) -> Self {
        Self {
            pool,
            handle_id: conn.handle_id,
            real: conn.real.clone(),
            real_id: conn.real_id,
            valid: conn.valid.clone(),
            released: false,
        }
    }

    /// False once returned, reclaimed as overdue, or force-closed.
    pub fn is_valid(&self) -> bool {
        !self.released && self.valid.load(Ordering::Acquire)
    }

    fn with_real<T>(&self, f: impl FnOnce(&mut dyn Connection) -> MapperResult<T>) -> MapperResult<T> {
        if !self.is_valid() {
            return Err(MapperError::connection(
                "Error accessing pooled connection. Connection is invalid.",
                "The lease was returned or reclaimed as overdue; acquire a new connection",
            ));
        }
        let mut real = self.real.lock();
        f(real.as_mut())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.pool.push_connection(self.handle_id);
        }
    }
}

impl fmt::Debug for PooledConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnectionHandle")
            .field("handle_id", &self.handle_id)
            .field("real_id", &self.real_id)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

impl Connection for PooledConnectionHandle {
    fn id(&self) -> u64 {
        self.real_id
    }

    fn prepare(&mut self, sql: &str) -> MapperResult<PreparedCommand> {
        self.with_real(|c| c.prepare(sql))
    }

    fn query(&mut self, command: &PreparedCommand) -> MapperResult<ResultSet> {
        self.with_real(|c| c.query(command))
    }

    fn execute(&mut self, command: &PreparedCommand) -> MapperResult<UpdateOutcome> {
        self.with_real(|c| c.execute(command))
    }

    fn auto_commit(&self) -> MapperResult<bool> {
        self.with_real(|c| c.auto_commit())
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> MapperResult<()> {
        self.with_real(|c| c.set_auto_commit(auto_commit))
    }

    fn set_isolation(&mut self, level: IsolationLevel) -> MapperResult<()> {
        self.with_real(|c| c.set_isolation(level))
    }

    fn commit(&mut self) -> MapperResult<()> {
        self.with_real(|c| c.commit())
    }

    fn rollback(&mut self) -> MapperResult<()> {
        self.with_real(|c| c.rollback())
    }

    fn ping(&mut self, query: Option<&str>) -> MapperResult<()> {
        self.with_real(|c| c.ping(query))
    }

    fn is_closed(&self) -> bool {
        !self.is_valid() || self.real.lock().is_closed()
    }

    fn close(&mut self) -> MapperResult<()> {
        self.release();
        Ok(())
    }
}

impl Drop for PooledConnectionHandle {
    fn drop(&mut self) {
        self.release();
    }
}
