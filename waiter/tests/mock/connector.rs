use async_trait::async_trait;
use kong_waiter::{CommandOutput, ConnectError, Connection, ConnectionSpec, Connector, ManualClock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Plays back a script of connection attempt results. Once the script runs out, the last entry
/// repeats.
pub(crate) struct MockConnector {
    clock: ManualClock,
    /// Virtual time one attempt takes, capped by the timeout the awaiter passes in.
    attempt_duration: Duration,
    script: Mutex<VecDeque<Result<(), ConnectError>>>,
    timeouts: Mutex<Vec<Duration>>,
    attempts: AtomicU32,
    /// Shared with every connection handed out.
    pub(crate) state: Arc<ConnectionState>,
}

/// What the connections handed out by a [`MockConnector`] report and what happened to them.
#[derive(Default)]
pub(crate) struct ConnectionState {
    active: Mutex<VecDeque<Result<bool, ConnectError>>>,
    pub(crate) checks: AtomicU32,
    pub(crate) closed: AtomicBool,
    pub(crate) output: Mutex<CommandOutput>,
}

impl MockConnector {
    pub(crate) fn new(
        clock: &ManualClock,
        attempt_duration: Duration,
        script: Vec<Result<(), ConnectError>>,
    ) -> Self {
        Self {
            clock: clock.clone(),
            attempt_duration,
            script: Mutex::new(script.into()),
            timeouts: Mutex::new(Vec::new()),
            attempts: AtomicU32::new(0),
            state: Arc::new(ConnectionState::default()),
        }
    }

    /// What successive `is_active` calls return. The last entry repeats.
    pub(crate) fn active(self, results: Vec<Result<bool, ConnectError>>) -> Self {
        *self.state.active.lock().unwrap() = results.into();
        self
    }

    pub(crate) fn output(self, output: CommandOutput) -> Self {
        *self.state.output.lock().unwrap() = output;
        self
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The per-attempt timeouts the awaiter asked for.
    pub(crate) fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(
        &self,
        _spec: &ConnectionSpec,
        timeout: Duration,
    ) -> Result<Self::Connection, ConnectError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.timeouts.lock().unwrap().push(timeout);
        self.clock.advance(self.attempt_duration.min(timeout));
        next(&self.script)?;
        Ok(MockConnection {
            clock: self.clock.clone(),
            state: Arc::clone(&self.state),
        })
    }
}

pub(crate) struct MockConnection {
    clock: ManualClock,
    state: Arc<ConnectionState>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn is_active(&self) -> Result<bool, ConnectError> {
        self.state.checks.fetch_add(1, Ordering::SeqCst);
        self.clock.advance(Duration::from_millis(10));
        next(&self.state.active)
    }

    async fn exec(&self, _command: &str) -> Result<CommandOutput, ConnectError> {
        Ok(self.state.output.lock().unwrap().clone())
    }

    async fn close(self) -> Result<(), ConnectError> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn next<T: Clone>(
    script: &Mutex<VecDeque<Result<T, ConnectError>>>,
) -> Result<T, ConnectError> {
    let mut script = script.lock().unwrap();
    if script.len() > 1 {
        script.pop_front().unwrap()
    } else {
        script
            .front()
            .cloned()
            .unwrap_or_else(|| Err(ConnectError::other("the mock has no script")))
    }
}
