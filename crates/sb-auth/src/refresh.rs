//! Token refresh coordination
//!
//! Owns the refresh-token exchange: single-flight de-duplication of
//! concurrent callers, proactive scheduling against the safe expiry, and
//! session teardown when the grant is revoked.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use sb_storage::StorageBackend;
use sb_types::{AppError, AppResult};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::endpoint::TokenEndpoint;
use crate::token::{self, Token};

/// Delay before a failed timer-driven refresh is retried.
const RETRY_DELAY_SECS: u64 = 30;

/// Timer-driven retries per expiry cycle. Once these are spent the lazy
/// expiry check in the session facade remains the only trigger.
const MAX_SCHEDULED_RETRIES: u32 = 3;

type SharedRefresh = Shared<BoxFuture<'static, AppResult<Token>>>;

/// Coordinates all refresh activity for the process.
///
/// Cheap to clone; clones share the in-flight marker and the timer, so the
/// single-flight guarantee holds across every handle in the process. It does
/// not hold across independent processes: two contexts may both refresh near
/// expiry, which is safe because each outcome is a valid token and the
/// persisted value is replaced wholesale.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<RefreshInner>,
}

struct RefreshInner {
    storage: Arc<dyn StorageBackend>,
    endpoint: Arc<dyn TokenEndpoint>,
    /// At most one outstanding refresh; concurrent callers clone and await
    /// the same shared future.
    in_flight: Mutex<Option<SharedRefresh>>,
    /// The armed proactive timer, replaced last-writer-wins.
    timer: Mutex<Option<JoinHandle<()>>>,
    scheduled_retries: AtomicU32,
}

impl RefreshCoordinator {
    pub fn new(storage: Arc<dyn StorageBackend>, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            inner: Arc::new(RefreshInner {
                storage,
                endpoint,
                in_flight: Mutex::new(None),
                timer: Mutex::new(None),
                scheduled_retries: AtomicU32::new(0),
            }),
        }
    }

    /// Refresh the session token, de-duplicating concurrent calls.
    ///
    /// Callers arriving while a refresh is outstanding are handed the same
    /// settled result; only one network call is made per flight. The
    /// in-flight marker is cleared whatever the outcome, so a later call can
    /// retry after a failure.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<Token> {
        Arc::clone(&self.inner).refresh(refresh_token.to_string()).await
    }

    /// Arm the proactive timer for `token`'s safe expiry, replacing any
    /// armed timer.
    ///
    /// Timers are best effort: the host can suspend the process at any
    /// point, so the lazy expiry check in the session facade stays
    /// authoritative.
    pub fn schedule_refresh(&self, token: &Token) {
        Arc::clone(&self.inner).schedule(delay_until(token.safe_expires_at));
    }

    /// Disarm the proactive timer. Called on logout and when storage reports
    /// the token was cleared externally.
    pub fn cancel_scheduled(&self) {
        self.inner.cancel();
    }

    /// Whether a proactive timer is currently armed.
    pub fn scheduled(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl RefreshInner {
    async fn refresh(self: Arc<Self>, refresh_token: String) -> AppResult<Token> {
        let pending = {
            let mut in_flight = self.in_flight.lock();
            if let Some(pending) = in_flight.as_ref() {
                debug!("joining in-flight token refresh");
                pending.clone()
            } else {
                let inner = Arc::clone(&self);
                // The exchange runs on a task of its own so it settles even
                // if every waiting caller is dropped mid-flight. The marker
                // is cleared there, not by the waiters, so a new flight can
                // only start once the old one has fully resolved.
                let task = tokio::spawn(async move {
                    let result = Arc::clone(&inner).execute(refresh_token).await;
                    *inner.in_flight.lock() = None;
                    result
                });
                let pending: SharedRefresh = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(err) => Err(AppError::RefreshFailed(format!(
                            "refresh task aborted: {}",
                            err
                        ))),
                    }
                }
                .boxed()
                .shared();
                *in_flight = Some(pending.clone());
                pending
            }
        };
        pending.await
    }

    async fn execute(self: Arc<Self>, refresh_token: String) -> AppResult<Token> {
        debug!("refreshing session token");

        // Latest persisted token, for carrying the scope forward when the
        // provider omits it in the refresh response.
        let previous = match token::read_token(self.storage.as_ref()) {
            Ok(previous) => previous,
            Err(err) => {
                warn!("could not read persisted token: {}", err);
                None
            }
        };

        match self.endpoint.refresh(&refresh_token).await {
            Ok(response) => {
                let previous_scope = previous.and_then(|t| t.scope);
                let token = Token::from_response(
                    response,
                    Some(refresh_token),
                    previous_scope,
                    Utc::now(),
                )?;

                // Persist before arming the next cycle so the schedule is
                // always computed from durable state.
                token::write_token(self.storage.as_ref(), &token)?;
                self.scheduled_retries.store(0, Ordering::Relaxed);
                Arc::clone(&self).schedule(delay_until(token.safe_expires_at));

                info!("session token refreshed");
                Ok(token)
            }
            Err(AppError::SessionRevoked) => {
                warn!("refresh token rejected, tearing down session");
                self.cancel();
                if let Err(err) = self.storage.remove(token::TOKEN_KEY) {
                    warn!("failed to clear revoked session token: {}", err);
                }
                Err(AppError::SessionRevoked)
            }
            Err(err) => {
                warn!("token refresh failed: {}", err);
                Err(err)
            }
        }
    }

    fn schedule(self: Arc<Self>, delay: std::time::Duration) {
        debug!("proactive refresh armed in {:?}", delay);

        let inner = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire().await;
        });

        if let Some(previous) = self.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Timer body. Re-reads durable state first: another execution context
    /// may have refreshed or cleared the session since the timer was armed.
    async fn fire(self: Arc<Self>) {
        let latest = match token::read_token(self.storage.as_ref()) {
            Ok(Some(latest)) => latest,
            Ok(None) => {
                debug!("scheduled refresh found no session token");
                return;
            }
            Err(err) => {
                warn!("scheduled refresh could not read storage: {}", err);
                return;
            }
        };

        if latest.is_fresh(Utc::now()) {
            // Another context already renewed the session; track the new
            // expiry instead of refreshing early.
            debug!("token already fresh, rescheduling");
            let delay = delay_until(latest.safe_expires_at);
            Arc::clone(&self).schedule(delay);
            return;
        }

        let refresh_token = latest.refresh_token.clone();
        match Arc::clone(&self).refresh(refresh_token).await {
            Ok(_) => {}
            // Teardown already happened inside the refresh.
            Err(AppError::SessionRevoked) => {}
            Err(err) => {
                let attempt = self.scheduled_retries.fetch_add(1, Ordering::Relaxed) + 1;
                if attempt <= MAX_SCHEDULED_RETRIES {
                    warn!(
                        "scheduled refresh failed (attempt {}), retrying in {}s: {}",
                        attempt, RETRY_DELAY_SECS, err
                    );
                    Arc::clone(&self).schedule(std::time::Duration::from_secs(RETRY_DELAY_SECS));
                } else {
                    warn!(
                        "scheduled refresh failed after {} attempts, waiting for next access: {}",
                        MAX_SCHEDULED_RETRIES, err
                    );
                }
            }
        }
    }

    fn cancel(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
        self.scheduled_retries.store(0, Ordering::Relaxed);
    }
}

fn delay_until(instant: DateTime<Utc>) -> std::time::Duration {
    (instant - Utc::now()).to_std().unwrap_or_default()
}
