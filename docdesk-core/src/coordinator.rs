//! Single-flight token refresh shared by every in-flight call.
//!
//! The coordinator owns the credential store, the signed-in identity, and
//! the refresh state. Calls that hit a first-time 401 hand themselves to
//! [`RefreshCoordinator::recover`]:
//!
//! 1. `Idle`: the call is queued, the state flips to `Refreshing`, and one
//!    refresh is started on a spawned task.
//! 2. `Refreshing`: the call is queued behind the refresh already running.
//! 3. When the refresh settles, the credential store is updated and every
//!    queued caller receives the same outcome, in insertion order.
//!
//! On failure the store is cleared and the session-terminated callbacks run
//! exactly once for the cycle, however many callers were queued.
//!
//! A 401 for a call sent with an older credential generation than the one
//! currently stored is answered with the current credential immediately: the
//! credential it failed with has already been replaced.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::auth::Refresher;
use crate::credential::{Credential, CredentialStore};
use crate::error::RefreshError;
use crate::model::{SessionGrant, UserIdentity};

/// Default bound on a single refresh.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Callback run when a refresh fails and the session is over.
pub type TerminationCallback = Arc<dyn Fn(&RefreshError) + Send + Sync>;

/// Whether a refresh is currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// A caller parked until the in-flight refresh settles.
struct PendingCall {
    label: String,
    waiter: oneshot::Sender<Result<Credential, RefreshError>>,
}

struct Inner {
    /// Signed-in identity. Written together with the credential store,
    /// under this lock.
    user: Option<UserIdentity>,
    state: RefreshState,
    queue: Vec<PendingCall>,
    /// Refresh cycles started so far.
    cycles: u64,
    /// Bumped whenever the session is replaced from outside a refresh
    /// (login, bootstrap, logout). A refresh started under an older epoch
    /// does not overwrite the newer session.
    epoch: u64,
}

/// Coordinates credential refresh across concurrent calls.
pub struct RefreshCoordinator {
    credentials: Arc<CredentialStore>,
    refresher: Arc<dyn Refresher>,
    refresh_timeout: Duration,
    inner: Mutex<Inner>,
    callbacks: Mutex<Vec<TerminationCallback>>,
    terminations: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        credentials: Arc<CredentialStore>,
        refresher: Arc<dyn Refresher>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            refresher,
            refresh_timeout,
            inner: Mutex::new(Inner {
                user: None,
                state: RefreshState::Idle,
                queue: Vec::new(),
                cycles: 0,
                epoch: 0,
            }),
            callbacks: Mutex::new(Vec::new()),
            terminations: AtomicU64::new(0),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.inner.lock().user.clone()
    }

    /// The credential and the identity it belongs to, read together.
    pub fn session(&self) -> (Option<Credential>, Option<UserIdentity>) {
        let inner = self.inner.lock();
        (self.credentials.get(), inner.user.clone())
    }

    /// Current session epoch. Pair with [`establish_if`](Self::establish_if).
    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    pub fn state(&self) -> RefreshState {
        self.inner.lock().state
    }

    /// Callers currently parked behind the in-flight refresh.
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Refresh cycles started since construction.
    pub fn cycles(&self) -> u64 {
        self.inner.lock().cycles
    }

    /// How many times the session has been terminated by a failed refresh.
    pub fn terminations(&self) -> u64 {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Register a callback for terminal refresh failures.
    pub fn on_session_terminated(&self, callback: impl Fn(&RefreshError) + Send + Sync + 'static) {
        self.callbacks.lock().push(Arc::new(callback));
    }

    /// Install (or clear) the session after login, bootstrap, or logout.
    pub fn establish(&self, grant: Option<SessionGrant>) {
        let mut inner = self.inner.lock();
        self.install(&mut inner, grant);
    }

    /// Like [`establish`](Self::establish), but only while the epoch is still
    /// `epoch`. Returns whether the session was installed.
    pub fn establish_if(&self, epoch: u64, grant: Option<SessionGrant>) -> bool {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return false;
        }
        self.install(&mut inner, grant);
        true
    }

    fn install(&self, inner: &mut Inner, grant: Option<SessionGrant>) {
        inner.epoch += 1;
        match grant {
            Some(SessionGrant {
                access_token, user, ..
            }) => {
                self.credentials.set(Some(access_token));
                inner.user = Some(user);
            }
            None => {
                self.credentials.set(None);
                inner.user = None;
            }
        }
    }

    /// Wait for a credential to replay a call that failed with 401.
    ///
    /// `sent_generation` is the credential generation the call was sent
    /// with. Resolves once the refresh this call joined (or started)
    /// settles; every caller of one cycle receives the same outcome.
    pub async fn recover(
        self: &Arc<Self>,
        label: impl Into<String>,
        sent_generation: u64,
    ) -> Result<Credential, RefreshError> {
        let label = label.into();
        let receiver = {
            let mut inner = self.inner.lock();

            if inner.state == RefreshState::Idle {
                let snapshot = self.credentials.snapshot();
                if snapshot.generation != sent_generation {
                    if let Some(credential) = snapshot.credential {
                        debug!(call = %label, "credential replaced since send, replaying");
                        return Ok(credential);
                    }
                }
            }

            let (waiter, receiver) = oneshot::channel();
            inner.queue.push(PendingCall {
                label: label.clone(),
                waiter,
            });

            match inner.state {
                RefreshState::Idle => {
                    inner.state = RefreshState::Refreshing;
                    inner.cycles += 1;
                    let cycle = inner.cycles;
                    let epoch = inner.epoch;
                    info!(cycle, call = %label, "credential rejected, starting refresh");

                    let this = Arc::clone(self);
                    tokio::spawn(async move { this.run_refresh(cycle, epoch).await });
                }
                RefreshState::Refreshing => {
                    debug!(
                        call = %label,
                        queued = inner.queue.len(),
                        "refresh in flight, queued"
                    );
                }
            }
            receiver
        };

        receiver.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    async fn run_refresh(self: Arc<Self>, cycle: u64, epoch: u64) {
        let mut guard = SettleGuard {
            coordinator: Arc::clone(&self),
            cycle,
            epoch,
            armed: true,
        };

        let outcome = match tokio::time::timeout(self.refresh_timeout, self.refresher.refresh()).await
        {
            Ok(result) => result,
            Err(_) => Err(RefreshError::Timeout {
                after_ms: self.refresh_timeout.as_millis() as u64,
            }),
        };

        guard.armed = false;
        self.settle(cycle, epoch, outcome);
    }

    fn settle(&self, cycle: u64, epoch: u64, outcome: Result<SessionGrant, RefreshError>) {
        let (waiters, delivered, current) = {
            let mut inner = self.inner.lock();
            let current = inner.epoch == epoch;

            let delivered = match outcome {
                Ok(SessionGrant {
                    access_token, user, ..
                }) => {
                    if current {
                        self.credentials.set(Some(access_token.clone()));
                        inner.user = Some(user);
                    }
                    Ok(access_token)
                }
                Err(e) => {
                    if current {
                        self.credentials.set(None);
                        inner.user = None;
                    }
                    Err(e)
                }
            };

            inner.state = RefreshState::Idle;
            (std::mem::take(&mut inner.queue), delivered, current)
        };

        match &delivered {
            Ok(_) => info!(cycle, waiters = waiters.len(), "refresh succeeded"),
            Err(e) => warn!(cycle, waiters = waiters.len(), error = %e, "refresh failed"),
        }
        if !current {
            debug!(cycle, "session replaced during refresh, outcome not installed");
        }

        for pending in waiters {
            if pending.waiter.send(delivered.clone()).is_err() {
                debug!(cycle, call = %pending.label, "caller went away before refresh settled");
            }
        }

        if let Err(e) = &delivered {
            if current {
                self.terminate(e);
            }
        }
    }

    fn terminate(&self, error: &RefreshError) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        let callbacks: Vec<TerminationCallback> = self.callbacks.lock().clone();
        for callback in callbacks {
            callback(error);
        }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RefreshCoordinator")
            .field("state", &inner.state)
            .field("pending", &inner.queue.len())
            .field("cycles", &inner.cycles)
            .finish()
    }
}

/// Settles the cycle as abandoned if the refresh task unwinds.
struct SettleGuard {
    coordinator: Arc<RefreshCoordinator>,
    cycle: u64,
    epoch: u64,
    armed: bool,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        if self.armed {
            self.coordinator
                .settle(self.cycle, self.epoch, Err(RefreshError::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;

    /// Refresher that blocks until released and then returns a scripted outcome.
    struct ScriptedRefresher {
        calls: AtomicUsize,
        gate: Semaphore,
        outcome: Result<&'static str, RefreshError>,
        panic: bool,
    }

    impl ScriptedRefresher {
        fn succeeding(token: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                outcome: Ok(token),
                panic: false,
            })
        }

        fn failing(error: RefreshError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                outcome: Err(error),
                panic: false,
            })
        }

        fn panicking() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                outcome: Ok("unused"),
                panic: true,
            })
        }

        fn release(&self) {
            self.gate.add_permits(1_000);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Refresher for ScriptedRefresher {
        async fn refresh(&self) -> Result<SessionGrant, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.unwrap();
            if self.panic {
                panic!("refresher blew up");
            }
            self.outcome.clone().map(grant)
        }
    }

    fn user() -> UserIdentity {
        serde_json::from_value(serde_json::json!({
            "id": "5f0c6b8e-3f43-4d8a-9a52-0f4b1c7d2e11",
            "username": "alice",
            "is_active": true
        }))
        .unwrap()
    }

    fn grant(token: &str) -> SessionGrant {
        SessionGrant {
            access_token: Credential::new(token),
            token_type: "bearer".into(),
            user: user(),
        }
    }

    fn coordinator(refresher: Arc<ScriptedRefresher>, timeout: Duration) -> Arc<RefreshCoordinator> {
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::new(CredentialStore::new()),
            refresher,
            timeout,
        ));
        coordinator.establish(Some(grant("T1")));
        coordinator
    }

    async fn wait_for_pending(coordinator: &RefreshCoordinator, n: usize) {
        for _ in 0..1_000 {
            if coordinator.pending() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("expected {n} pending callers, saw {}", coordinator.pending());
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_refresh() {
        let refresher = ScriptedRefresher::succeeding("T2");
        let coordinator = coordinator(refresher.clone(), DEFAULT_REFRESH_TIMEOUT);
        let generation = coordinator.credentials().generation();

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let c = coordinator.clone();
                tokio::spawn(async move { c.recover(format!("call-{i}"), generation).await })
            })
            .collect();

        wait_for_pending(&coordinator, 5).await;
        assert_eq!(coordinator.state(), RefreshState::Refreshing);
        refresher.release();

        for handle in handles {
            let credential = handle.await.unwrap().unwrap();
            assert_eq!(credential.expose(), "T2");
        }

        assert_eq!(refresher.calls(), 1);
        assert_eq!(coordinator.cycles(), 1);
        assert_eq!(coordinator.state(), RefreshState::Idle);
        assert_eq!(coordinator.pending(), 0);
        assert_eq!(coordinator.credentials().get().unwrap().expose(), "T2");
        assert_eq!(coordinator.current_user().unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_failure_rejects_all_and_terminates_once() {
        let refresher = ScriptedRefresher::failing(RefreshError::Rejected {
            status: 401,
            detail: "Refresh token not found".into(),
        });
        let coordinator = coordinator(refresher.clone(), DEFAULT_REFRESH_TIMEOUT);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        coordinator.on_session_terminated(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let generation = coordinator.credentials().generation();

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let c = coordinator.clone();
                tokio::spawn(async move { c.recover(format!("call-{i}"), generation).await })
            })
            .collect();

        wait_for_pending(&coordinator, 3).await;
        refresher.release();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, RefreshError::Rejected { status: 401, .. }));
        }

        assert_eq!(refresher.calls(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.terminations(), 1);
        assert!(coordinator.credentials().get().is_none());
        assert!(coordinator.current_user().is_none());
        assert_eq!(coordinator.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_timed_out_refresh_is_a_failure() {
        let refresher = ScriptedRefresher::succeeding("never");
        let coordinator = coordinator(refresher.clone(), Duration::from_millis(50));
        let generation = coordinator.credentials().generation();

        let err = coordinator.recover("slow", generation).await.unwrap_err();
        assert_eq!(err, RefreshError::Timeout { after_ms: 50 });
        assert_eq!(coordinator.terminations(), 1);
        assert!(coordinator.credentials().get().is_none());
    }

    #[tokio::test]
    async fn test_stale_generation_replays_without_refresh() {
        let refresher = ScriptedRefresher::succeeding("unused");
        let coordinator = coordinator(refresher.clone(), DEFAULT_REFRESH_TIMEOUT);
        let sent_with = coordinator.credentials().generation();

        coordinator.establish(Some(grant("T2")));

        let credential = coordinator.recover("late", sent_with).await.unwrap();
        assert_eq!(credential.expose(), "T2");
        assert_eq!(refresher.calls(), 0);
        assert_eq!(coordinator.cycles(), 0);
    }

    #[tokio::test]
    async fn test_failure_after_settle_starts_disjoint_cycle() {
        let refresher = ScriptedRefresher::succeeding("T2");
        refresher.release();
        let coordinator = coordinator(refresher.clone(), DEFAULT_REFRESH_TIMEOUT);

        let first = coordinator
            .recover("first", coordinator.credentials().generation())
            .await
            .unwrap();
        assert_eq!(first.expose(), "T2");

        // Rejected again with the current credential: a new cycle starts.
        let second = coordinator
            .recover("second", coordinator.credentials().generation())
            .await
            .unwrap();
        assert_eq!(second.expose(), "T2");
        assert_eq!(refresher.calls(), 2);
        assert_eq!(coordinator.cycles(), 2);
    }

    #[tokio::test]
    async fn test_logout_during_refresh_is_not_overwritten() {
        let refresher = ScriptedRefresher::succeeding("T2");
        let coordinator = coordinator(refresher.clone(), DEFAULT_REFRESH_TIMEOUT);
        let generation = coordinator.credentials().generation();

        let c = coordinator.clone();
        let handle = tokio::spawn(async move { c.recover("inflight", generation).await });
        wait_for_pending(&coordinator, 1).await;

        coordinator.establish(None);
        refresher.release();

        assert_eq!(handle.await.unwrap().unwrap().expose(), "T2");
        assert!(coordinator.credentials().get().is_none());
        assert!(coordinator.current_user().is_none());
    }

    #[tokio::test]
    async fn test_establish_if_skips_replaced_session() {
        let refresher = ScriptedRefresher::succeeding("unused");
        let coordinator = coordinator(refresher, DEFAULT_REFRESH_TIMEOUT);
        let before = coordinator.epoch();

        coordinator.establish(Some(grant("T2")));

        assert!(!coordinator.establish_if(before, None));
        let (credential, user) = coordinator.session();
        assert_eq!(credential.unwrap().expose(), "T2");
        assert_eq!(user.unwrap().username, "alice");

        assert!(coordinator.establish_if(coordinator.epoch(), None));
        assert_eq!(coordinator.session(), (None, None));
    }

    #[tokio::test]
    async fn test_session_reads_credential_and_user_together() {
        let refresher = ScriptedRefresher::failing(RefreshError::Abandoned);
        refresher.release();
        let coordinator = coordinator(refresher, DEFAULT_REFRESH_TIMEOUT);

        let (credential, user) = coordinator.session();
        assert!(credential.is_some() && user.is_some());

        let generation = coordinator.credentials().generation();
        coordinator.recover("doomed", generation).await.unwrap_err();

        let (credential, user) = coordinator.session();
        assert!(credential.is_none() && user.is_none());
    }

    #[tokio::test]
    async fn test_panicking_refresh_is_abandoned() {
        let refresher = ScriptedRefresher::panicking();
        refresher.release();
        let coordinator = coordinator(refresher.clone(), DEFAULT_REFRESH_TIMEOUT);
        let generation = coordinator.credentials().generation();

        let err = coordinator.recover("doomed", generation).await.unwrap_err();
        assert_eq!(err, RefreshError::Abandoned);
        assert_eq!(coordinator.state(), RefreshState::Idle);
        assert_eq!(coordinator.terminations(), 1);
    }
}
