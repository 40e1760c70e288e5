//! Presence keepalive
//!
//! Re-sends the connected activity on an interval. When the chat client went
//! away (restart, crash) the send fails and the connection is re-established
//! with the same application ID.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::state::{HostState, SharedState};

/// What a keepalive tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Nothing connected
    Idle,
    /// Activity re-sent on the existing connection
    Refreshed,
    /// Connection was re-established and the activity re-applied
    Reconnected,
    /// Reconnecting failed; retried on the next tick
    Failed,
}

/// Re-send the connected activity, reconnecting if needed
pub fn refresh_presence(state: &mut HostState) -> Refresh {
    let Some(connected) = state.connected().cloned() else {
        return Refresh::Idle;
    };

    let presence = state.presence_mut();
    let on_app = presence.app_id() == Some(connected.app_id.as_str());
    if on_app && presence.is_connected() && presence.update(&connected.activity).is_ok() {
        return Refresh::Refreshed;
    }

    if on_app {
        tracing::warn!("Presence for '{}' was lost, reconnecting", connected.name);
    } else {
        tracing::warn!(
            "Presence is not on the application of '{}', reconnecting",
            connected.name
        );
    }
    if let Err(e) = presence.close() {
        tracing::debug!("Error closing dead connection: {}", e);
    }
    let result = match presence.connect(&connected.app_id) {
        Ok(()) => presence.update(&connected.activity),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            tracing::info!("Reconnected presence for '{}'", connected.name);
            Refresh::Reconnected
        }
        Err(e) => {
            tracing::warn!("Reconnect failed: {}", e);
            Refresh::Failed
        }
    }
}

/// Periodic presence refresher
pub struct Keepalive {
    /// Time between refreshes
    pub interval: Duration,
}

impl Keepalive {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Spawn the refresh loop; it stops when `shutdown` is cancelled
    pub fn spawn(
        &self,
        state: SharedState,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        // A zero period would make tokio's interval panic
        let period = self.interval.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let state = Arc::clone(&state);
                        let outcome =
                            tokio::task::spawn_blocking(move || refresh_presence(&mut state.lock()))
                                .await;
                        match outcome {
                            Ok(refresh) => tracing::trace!("Keepalive tick: {:?}", refresh),
                            Err(e) => tracing::error!("Keepalive task failed: {}", e),
                        }
                    }
                }
            }
            tracing::debug!("Keepalive stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use tempfile::TempDir;

    use crpc_core::{Activity, IpcCommand, PresenceClient, PresenceError, Profile, ProfileStore};

    use crate::dispatch::dispatch;

    /// Presence whose next `update` can be made to fail once
    struct FlakyPresence {
        app_id: Option<String>,
        fail_next_update: Arc<Mutex<bool>>,
        updates: Arc<AtomicUsize>,
        connects: Arc<AtomicUsize>,
    }

    impl PresenceClient for FlakyPresence {
        fn connect(&mut self, app_id: &str) -> Result<(), PresenceError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.app_id = Some(app_id.to_string());
            Ok(())
        }

        fn update(&mut self, _activity: &Activity) -> Result<(), PresenceError> {
            let mut fail = self.fail_next_update.lock();
            if *fail {
                *fail = false;
                return Err(PresenceError::Update("broken pipe".to_string()));
            }
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn clear(&mut self) -> Result<(), PresenceError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), PresenceError> {
            self.app_id = None;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.app_id.is_some()
        }

        fn app_id(&self) -> Option<&str> {
            self.app_id.as_deref()
        }
    }

    struct Fixture {
        _dir: TempDir,
        state: HostState,
        fail_next_update: Arc<Mutex<bool>>,
        updates: Arc<AtomicUsize>,
        connects: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles")).unwrap();
        store
            .create(Profile {
                app_id: "123456789012345678".to_string(),
                details: "Ranked".to_string(),
                ..Profile::new("Gaming")
            })
            .unwrap();

        let fail_next_update = Arc::new(Mutex::new(false));
        let updates = Arc::new(AtomicUsize::new(0));
        let connects = Arc::new(AtomicUsize::new(0));
        let presence = FlakyPresence {
            app_id: None,
            fail_next_update: Arc::clone(&fail_next_update),
            updates: Arc::clone(&updates),
            connects: Arc::clone(&connects),
        };

        Fixture {
            _dir: dir,
            state: HostState::new(store, Box::new(presence)),
            fail_next_update,
            updates,
            connects,
        }
    }

    #[test]
    fn test_idle_does_nothing() {
        let mut fx = fixture();
        assert_eq!(refresh_presence(&mut fx.state), Refresh::Idle);
        assert_eq!(fx.connects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_refresh_resends_activity() {
        let mut fx = fixture();
        let token = CancellationToken::new();
        dispatch(
            &mut fx.state,
            IpcCommand::Connect {
                profile: Some("Gaming".to_string()),
            },
            &token,
        );

        assert_eq!(refresh_presence(&mut fx.state), Refresh::Refreshed);
        assert_eq!(fx.updates.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_update_reconnects() {
        let mut fx = fixture();
        let token = CancellationToken::new();
        dispatch(
            &mut fx.state,
            IpcCommand::Connect {
                profile: Some("Gaming".to_string()),
            },
            &token,
        );

        *fx.fail_next_update.lock() = true;
        assert_eq!(refresh_presence(&mut fx.state), Refresh::Reconnected);
        assert_eq!(fx.connects.load(Ordering::SeqCst), 2);
        assert_eq!(fx.updates.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_presence_on_other_application_reconnects() {
        let mut fx = fixture();
        let token = CancellationToken::new();
        dispatch(
            &mut fx.state,
            IpcCommand::Connect {
                profile: Some("Gaming".to_string()),
            },
            &token,
        );

        fx.state
            .presence_mut()
            .connect("876543210987654321")
            .unwrap();
        assert_eq!(refresh_presence(&mut fx.state), Refresh::Reconnected);
        assert_eq!(
            fx.state.presence_mut().app_id(),
            Some("123456789012345678")
        );
        assert_eq!(fx.connects.load(Ordering::SeqCst), 3);
        assert_eq!(fx.updates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_on_shutdown() {
        let fx = fixture();
        let state = fx.state.into_shared();
        let token = CancellationToken::new();

        let handle = Keepalive::new(Duration::from_secs(10)).spawn(state, token.clone());
        tokio::time::sleep(Duration::from_secs(25)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("keepalive did not stop")
            .unwrap();
    }
}
