//! Short-lived session credentials and the provider seam.
//!
//! A [`Credential`] is immutable once issued; renewal supersedes it with a
//! fresh one rather than mutating it in place. The controller holds at most
//! one current credential per session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Credential {
    /// Short-lived authorization token.
    pub token: String,
    /// Absolute expiry; must stay in the future while the session is
    /// connected.
    pub expires_at: DateTime<Utc>,
    /// Channel / address the transport should join.
    pub channel: String,
    /// Identifier the remote end knows us by.
    pub participant_id: String,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// True when the credential expires within `lead` from now.
    pub fn expires_within(&self, lead: Duration) -> bool {
        self.time_until_expiry() <= lead
    }

    /// Time remaining until expiry, zero if already expired.
    pub fn time_until_expiry(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// What a session asks the provider for.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
}

/// External collaborator that issues session credentials. May be shared
/// across sessions; a failure here is classified as a credential error and
/// is never retried by the controller.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credential(&self, ctx: &SessionContext) -> Result<Credential, anyhow::Error>;
}

pub mod mock {
    //! Credential provider double for tests.

    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Issues sequentially numbered tokens with a fixed time-to-live.
    pub struct MockCredentialProvider {
        ttl: Duration,
        issued: AtomicU32,
        fail: AtomicBool,
    }

    impl MockCredentialProvider {
        pub fn new(ttl: Duration) -> Self {
            Self {
                ttl,
                issued: AtomicU32::new(0),
                fail: AtomicBool::new(false),
            }
        }

        pub fn issued_count(&self) -> u32 {
            self.issued.load(Ordering::SeqCst)
        }

        pub fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CredentialProvider for MockCredentialProvider {
        async fn get_credential(
            &self,
            ctx: &SessionContext,
        ) -> Result<Credential, anyhow::Error> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("auth backend rejected the request");
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Credential {
                token: format!("token-{n}"),
                expires_at: Utc::now()
                    + chrono::Duration::from_std(self.ttl)
                        .unwrap_or_else(|_| chrono::Duration::seconds(3600)),
                channel: format!("channel-{}", ctx.session_id),
                participant_id: "local-1".to_string(),
            })
        }
    }
}
