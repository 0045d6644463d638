//! Failed-login throttle with lockout
//!
//! Attempts are keyed by `(ip, session id)`. Only failed attempts keep the
//! counter alive: a successful login clears it. Once `max_attempts` failures
//! land inside the window the key is locked out until the window drains,
//! and locked attempts do not push the lockout further.

use std::time::{Duration, Instant};

use crate::rate_store::{Anchor, RateStore};

/// Key used when the client never established a session. Attempts without
/// a session cookie aggregate under this sentinel per ip.
const ANONYMOUS_SESSION: &str = "anonymous";

/// Login throttle configuration
#[derive(Debug, Clone)]
pub struct LoginThrottleConfig {
    /// Failed attempts allowed per window
    pub max_attempts: u32,
    /// Window measured from the most recent attempt
    pub window: Duration,
}

impl Default for LoginThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(30),
        }
    }
}

impl LoginThrottleConfig {
    /// Create a new LoginThrottleConfig from environment variables
    ///
    /// # Environment Variables
    /// - `LOGIN_MAX_ATTEMPTS`: failed attempts per window (default: 5)
    /// - `LOGIN_WINDOW_SECONDS`: window length (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_attempts = std::env::var("LOGIN_MAX_ATTEMPTS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(defaults.max_attempts);

        let window = std::env::var("LOGIN_WINDOW_SECONDS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.window);

        Self {
            max_attempts,
            window,
        }
    }
}

/// Outcome of recording a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleOutcome {
    /// The key is locked out; reject with 429 and report the remaining time
    Locked {
        /// Whole seconds until the lockout drains, rounded up
        remaining_secs: u64,
    },
    /// The attempt was counted; on verification failure report how many
    /// attempts remain before lockout
    Counted {
        /// Attempts left before the key locks
        remaining_attempts: u32,
    },
}

/// Per-(ip, session) login attempt throttle
#[derive(Clone)]
pub struct LoginThrottle<S> {
    config: LoginThrottleConfig,
    store: S,
}

impl<S: RateStore> LoginThrottle<S> {
    /// Create a new login throttle on top of the given counter store
    pub fn new(config: LoginThrottleConfig, store: S) -> Self {
        Self { config, store }
    }

    fn key(ip: &str, session_id: Option<&str>) -> String {
        format!("{}:{}", ip, session_id.unwrap_or(ANONYMOUS_SESSION))
    }

    /// Record a login attempt before credential verification
    pub async fn record_attempt(&self, ip: &str, session_id: Option<&str>) -> ThrottleOutcome {
        let key = Self::key(ip, session_id);
        let hit = self
            .store
            .hit(
                &key,
                self.config.window,
                Anchor::LastHit,
                Some(self.config.max_attempts),
            )
            .await;

        if hit.capped {
            let elapsed = Instant::now().duration_since(hit.last_hit);
            let remaining = self.config.window.saturating_sub(elapsed);
            ThrottleOutcome::Locked {
                remaining_secs: (remaining.as_secs_f64().ceil() as u64).max(1),
            }
        } else {
            ThrottleOutcome::Counted {
                remaining_attempts: self.config.max_attempts.saturating_sub(hit.count),
            }
        }
    }

    /// Clear the counter after a successful login
    pub async fn clear(&self, ip: &str, session_id: Option<&str>) {
        self.store.clear(&Self::key(ip, session_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_store::MemoryRateStore;

    fn throttle(config: LoginThrottleConfig) -> LoginThrottle<MemoryRateStore> {
        LoginThrottle::new(config, MemoryRateStore::new())
    }

    #[tokio::test]
    async fn test_counts_down_remaining_attempts() {
        let throttle = throttle(LoginThrottleConfig::default());

        for expected in (0..5u32).rev() {
            let outcome = throttle.record_attempt("1.2.3.4", Some("s1")).await;
            assert_eq!(
                outcome,
                ThrottleOutcome::Counted {
                    remaining_attempts: expected
                }
            );
        }
    }

    #[tokio::test]
    async fn test_locks_after_max_attempts_with_positive_remaining_time() {
        let throttle = throttle(LoginThrottleConfig::default());

        for _ in 0..5 {
            throttle.record_attempt("1.2.3.4", Some("s1")).await;
        }

        match throttle.record_attempt("1.2.3.4", Some("s1")).await {
            ThrottleOutcome::Locked { remaining_secs } => {
                assert!(remaining_secs > 0);
                assert!(remaining_secs <= 30);
            }
            outcome => panic!("expected lockout, got {outcome:?}"),
        }
    }

    #[tokio::test]
    async fn test_locked_attempts_do_not_extend_the_lockout() {
        let throttle = throttle(LoginThrottleConfig {
            max_attempts: 2,
            window: Duration::from_millis(100),
        });

        throttle.record_attempt("ip", Some("s")).await;
        throttle.record_attempt("ip", Some("s")).await;
        assert!(matches!(
            throttle.record_attempt("ip", Some("s")).await,
            ThrottleOutcome::Locked { .. }
        ));

        // Hammering a locked key must not reset the window.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(matches!(
            throttle.record_attempt("ip", Some("s")).await,
            ThrottleOutcome::Locked { .. }
        ));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(matches!(
            throttle.record_attempt("ip", Some("s")).await,
            ThrottleOutcome::Counted { .. }
        ));
    }

    #[tokio::test]
    async fn test_clear_resets_the_counter() {
        let throttle = throttle(LoginThrottleConfig::default());

        for _ in 0..5 {
            throttle.record_attempt("1.2.3.4", Some("s1")).await;
        }
        throttle.clear("1.2.3.4", Some("s1")).await;

        assert_eq!(
            throttle.record_attempt("1.2.3.4", Some("s1")).await,
            ThrottleOutcome::Counted {
                remaining_attempts: 4
            }
        );
    }

    #[tokio::test]
    async fn test_lockout_drains_after_window() {
        let throttle = throttle(LoginThrottleConfig {
            max_attempts: 2,
            window: Duration::from_millis(80),
        });

        throttle.record_attempt("ip", Some("s")).await;
        throttle.record_attempt("ip", Some("s")).await;
        assert!(matches!(
            throttle.record_attempt("ip", Some("s")).await,
            ThrottleOutcome::Locked { .. }
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            throttle.record_attempt("ip", Some("s")).await,
            ThrottleOutcome::Counted {
                remaining_attempts: 1
            }
        );
    }

    #[tokio::test]
    async fn test_missing_session_aggregates_under_sentinel() {
        let throttle = throttle(LoginThrottleConfig {
            max_attempts: 2,
            window: Duration::from_secs(30),
        });

        throttle.record_attempt("ip", None).await;
        throttle.record_attempt("ip", None).await;
        assert!(matches!(
            throttle.record_attempt("ip", None).await,
            ThrottleOutcome::Locked { .. }
        ));

        // A client with a real session is keyed separately.
        assert!(matches!(
            throttle.record_attempt("ip", Some("s1")).await,
            ThrottleOutcome::Counted { .. }
        ));
    }
}
