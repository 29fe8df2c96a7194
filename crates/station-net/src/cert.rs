//! Certificate lifecycle manager for the internet channel's TLS identity.
//!
//! Drives an ACME-style request/renew state machine:
//!
//! ```text
//! Unrequested -> Requesting -> { Issued | Failed }
//! Issued -> RenewalDue -> Requesting   (renewal loop)
//! Issued -> Expired                    (renewal disabled or failing)
//! ```
//!
//! Renewal failures back off exponentially and land in `last_error`; the
//! previously issued certificate keeps being served until it actually
//! expires. An expired certificate is reported, never silently discarded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use station_shared::constants::{
    CERT_BACKOFF_INITIAL_SECS, CERT_BACKOFF_MAX_SECS, CERT_RENEWAL_WINDOW_DAYS,
    CERT_REQUEST_TIMEOUT_SECS,
};

use crate::error::CertError;

/// Production ACME-style directory endpoint.
pub const DIRECTORY_URL: &str = "https://ca.geogram.dev/directory";

/// Staging endpoint; issues throwaway certificates without rate limits.
pub const STAGING_DIRECTORY_URL: &str = "https://ca-staging.geogram.dev/directory";

/// Certificate material returned by an authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub domain: String,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub expires_at: DateTime<Utc>,
}

impl IssuedCertificate {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Observable certificate state, reported through `status()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateState {
    pub domain: String,
    pub email: String,
    pub has_certificate: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub last_error: Option<String>,
}

/// Where the state machine currently sits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CertPhase {
    Unrequested,
    Requesting,
    Issued,
    RenewalDue,
    Failed,
    Expired,
}

/// The external authority the manager exchanges with. Injected so the
/// station service decides whether it talks to a real CA, a self-signed
/// dev authority, or a test double.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    async fn issue(
        &self,
        domain: &str,
        email: &str,
        staging: bool,
    ) -> Result<IssuedCertificate, CertError>;
}

/// HTTP-backed authority speaking the simplified directory exchange.
pub struct HttpAuthority {
    client: reqwest::Client,
}

#[derive(Serialize)]
struct IssueRequest<'a> {
    domain: &'a str,
    email: &'a str,
}

#[derive(Deserialize)]
struct IssueResponse {
    certificate_pem: String,
    private_key_pem: String,
    expires_at: DateTime<Utc>,
}

impl HttpAuthority {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpAuthority {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CertificateAuthority for HttpAuthority {
    async fn issue(
        &self,
        domain: &str,
        email: &str,
        staging: bool,
    ) -> Result<IssuedCertificate, CertError> {
        let url = if staging {
            STAGING_DIRECTORY_URL
        } else {
            DIRECTORY_URL
        };

        let response = self
            .client
            .post(url)
            .json(&IssueRequest { domain, email })
            .send()
            .await
            .map_err(|e| CertError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CertError::RequestFailed(format!(
                "authority returned {}",
                response.status()
            )));
        }

        let body: IssueResponse = response
            .json()
            .await
            .map_err(|e| CertError::RequestFailed(e.to_string()))?;

        Ok(IssuedCertificate {
            domain: domain.to_string(),
            certificate_pem: body.certificate_pem,
            private_key_pem: body.private_key_pem,
            expires_at: body.expires_at,
        })
    }
}

/// Dev-only authority that issues a locally generated self-signed
/// certificate, treated as valid for 90 days.
pub struct SelfSignedAuthority;

#[async_trait]
impl CertificateAuthority for SelfSignedAuthority {
    async fn issue(
        &self,
        domain: &str,
        _email: &str,
        _staging: bool,
    ) -> Result<IssuedCertificate, CertError> {
        let certified = rcgen::generate_simple_self_signed(vec![domain.to_string()])
            .map_err(|e| CertError::RequestFailed(e.to_string()))?;
        Ok(IssuedCertificate {
            domain: domain.to_string(),
            certificate_pem: certified.cert.pem(),
            private_key_pem: certified.key_pair.serialize_pem(),
            expires_at: Utc::now() + chrono::Duration::days(90),
        })
    }
}

struct CertInner {
    domain: String,
    email: String,
    auto_renew: bool,
    requesting: bool,
    material: Option<IssuedCertificate>,
    last_error: Option<String>,
    consecutive_failures: u32,
}

/// The certificate lifecycle manager.
pub struct CertificateManager {
    authority: Arc<dyn CertificateAuthority>,
    inner: Mutex<CertInner>,
    request_timeout: Duration,
}

impl CertificateManager {
    pub fn new(authority: Arc<dyn CertificateAuthority>) -> Self {
        Self {
            authority,
            inner: Mutex::new(CertInner {
                domain: String::new(),
                email: String::new(),
                auto_renew: true,
                requesting: false,
                material: None,
                last_error: None,
                consecutive_failures: 0,
            }),
            request_timeout: Duration::from_secs(CERT_REQUEST_TIMEOUT_SECS),
        }
    }

    #[cfg(test)]
    fn with_timeout(authority: Arc<dyn CertificateAuthority>, timeout: Duration) -> Self {
        let mut manager = Self::new(authority);
        manager.request_timeout = timeout;
        manager
    }

    /// Apply domain/email/auto-renew from the network settings.
    pub async fn configure(&self, domain: Option<String>, email: Option<String>, auto_renew: bool) {
        let mut inner = self.inner.lock().await;
        inner.domain = domain.unwrap_or_default();
        inner.email = email.unwrap_or_default();
        inner.auto_renew = auto_renew;
    }

    /// Request (or renew) a certificate from the authority.
    ///
    /// Fails fast with `MissingParameter` before any network contact when
    /// domain or email is empty. Bounded by the request timeout. On renewal
    /// failure the previously issued material is kept.
    pub async fn request_certificate(&self, staging: bool) -> Result<IssuedCertificate, CertError> {
        let (domain, email) = {
            let mut inner = self.inner.lock().await;
            if inner.domain.trim().is_empty() {
                return Err(CertError::MissingParameter("domain"));
            }
            if inner.email.trim().is_empty() {
                return Err(CertError::MissingParameter("email"));
            }
            inner.requesting = true;
            (inner.domain.clone(), inner.email.clone())
        };

        debug!(domain = %domain, staging, "Requesting certificate");

        // The authority exchange runs without the state lock so status
        // queries stay responsive while a request is in flight.
        let result = tokio::time::timeout(
            self.request_timeout,
            self.authority.issue(&domain, &email, staging),
        )
        .await
        .unwrap_or_else(|_| {
            Err(CertError::RequestFailed(format!(
                "timed out after {}s",
                self.request_timeout.as_secs()
            )))
        });

        let mut inner = self.inner.lock().await;
        inner.requesting = false;
        match result {
            Ok(cert) => {
                info!(domain = %domain, expires_at = %cert.expires_at, "Certificate issued");
                inner.material = Some(cert.clone());
                inner.last_error = None;
                inner.consecutive_failures = 0;
                Ok(cert)
            }
            Err(e) => {
                warn!(domain = %domain, error = %e, "Certificate request failed");
                inner.last_error = Some(e.to_string());
                inner.consecutive_failures += 1;
                // Previously issued material stays in place; never
                // revoke-on-renewal-failure.
                Err(e)
            }
        }
    }

    /// Current observable state.
    pub async fn status(&self) -> CertificateState {
        let inner = self.inner.lock().await;
        CertificateState {
            domain: inner.domain.clone(),
            email: inner.email.clone(),
            has_certificate: inner.material.is_some(),
            expires_at: inner.material.as_ref().map(|m| m.expires_at),
            auto_renew: inner.auto_renew,
            last_error: inner.last_error.clone(),
        }
    }

    /// Where the state machine sits at `now`.
    pub async fn phase(&self, now: DateTime<Utc>) -> CertPhase {
        let inner = self.inner.lock().await;
        if inner.requesting {
            return CertPhase::Requesting;
        }
        match &inner.material {
            None if inner.last_error.is_some() => CertPhase::Failed,
            None => CertPhase::Unrequested,
            Some(material) if material.is_expired(now) => CertPhase::Expired,
            Some(material) => {
                let window = chrono::Duration::days(CERT_RENEWAL_WINDOW_DAYS);
                if material.expires_at - now <= window {
                    CertPhase::RenewalDue
                } else {
                    CertPhase::Issued
                }
            }
        }
    }

    /// The issued certificate, when one exists and has not expired. This is
    /// the HTTPS gating query: no valid certificate, no TLS port.
    pub async fn valid_certificate(&self, now: DateTime<Utc>) -> Option<IssuedCertificate> {
        let inner = self.inner.lock().await;
        inner
            .material
            .as_ref()
            .filter(|m| !m.is_expired(now))
            .cloned()
    }

    /// Whether auto-renewal should fire at `now`.
    pub async fn renewal_due(&self, now: DateTime<Utc>) -> bool {
        let inner = self.inner.lock().await;
        if !inner.auto_renew || inner.requesting {
            return false;
        }
        match &inner.material {
            Some(material) => {
                material.expires_at - now <= chrono::Duration::days(CERT_RENEWAL_WINDOW_DAYS)
            }
            None => false,
        }
    }

    /// Exponential backoff for the renewal loop: doubles per consecutive
    /// failure, capped at the configured ceiling.
    pub async fn current_backoff(&self) -> Duration {
        let inner = self.inner.lock().await;
        backoff_for(inner.consecutive_failures)
    }
}

fn backoff_for(failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    let exp = failures.saturating_sub(1).min(16);
    let secs = CERT_BACKOFF_INITIAL_SECS
        .saturating_mul(1u64 << exp)
        .min(CERT_BACKOFF_MAX_SECS);
    Duration::from_secs(secs)
}

/// Background renewal loop: checks every `check_interval`, renews inside
/// the 30-day window, and sleeps out the backoff after failures.
pub fn spawn_renewal_task(
    manager: Arc<CertificateManager>,
    check_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(check_interval);
        loop {
            interval.tick().await;
            if !manager.renewal_due(Utc::now()).await {
                continue;
            }
            match manager.request_certificate(false).await {
                Ok(cert) => {
                    info!(domain = %cert.domain, expires_at = %cert.expires_at, "Certificate renewed");
                }
                Err(e) => {
                    let backoff = manager.current_backoff().await;
                    error!(error = %e, backoff_secs = backoff.as_secs(), "Renewal failed, backing off");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Authority scripted to fail a fixed number of times before issuing.
    struct FlakyAuthority {
        failures_remaining: AtomicU32,
        validity_days: i64,
    }

    impl FlakyAuthority {
        fn new(failures: u32, validity_days: i64) -> Self {
            Self {
                failures_remaining: AtomicU32::new(failures),
                validity_days,
            }
        }
    }

    #[async_trait]
    impl CertificateAuthority for FlakyAuthority {
        async fn issue(
            &self,
            domain: &str,
            _email: &str,
            _staging: bool,
        ) -> Result<IssuedCertificate, CertError> {
            if self.failures_remaining.load(Ordering::SeqCst) > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(CertError::RequestFailed("authority unavailable".into()));
            }
            Ok(IssuedCertificate {
                domain: domain.to_string(),
                certificate_pem: "cert".into(),
                private_key_pem: "key".into(),
                expires_at: Utc::now() + chrono::Duration::days(self.validity_days),
            })
        }
    }

    struct HangingAuthority;

    #[async_trait]
    impl CertificateAuthority for HangingAuthority {
        async fn issue(
            &self,
            _domain: &str,
            _email: &str,
            _staging: bool,
        ) -> Result<IssuedCertificate, CertError> {
            futures::future::pending().await
        }
    }

    async fn configured(authority: Arc<dyn CertificateAuthority>) -> CertificateManager {
        let manager = CertificateManager::new(authority);
        manager
            .configure(
                Some("station.example.org".into()),
                Some("op@example.org".into()),
                true,
            )
            .await;
        manager
    }

    #[tokio::test]
    async fn test_missing_domain_fails_fast() {
        let manager = CertificateManager::new(Arc::new(SelfSignedAuthority));
        manager
            .configure(Some("".into()), Some("a@b.com".into()), true)
            .await;

        let err = manager.request_certificate(false).await.unwrap_err();
        assert_eq!(err, CertError::MissingParameter("domain"));
        assert_eq!(manager.phase(Utc::now()).await, CertPhase::Unrequested);
        assert!(!manager.status().await.has_certificate);
    }

    #[tokio::test]
    async fn test_missing_email_fails_fast() {
        let manager = CertificateManager::new(Arc::new(SelfSignedAuthority));
        manager
            .configure(Some("station.example.org".into()), None, true)
            .await;
        let err = manager.request_certificate(false).await.unwrap_err();
        assert_eq!(err, CertError::MissingParameter("email"));
    }

    #[tokio::test]
    async fn test_issue_transitions_to_issued() {
        let manager = configured(Arc::new(SelfSignedAuthority)).await;
        let cert = manager.request_certificate(true).await.unwrap();
        assert_eq!(cert.domain, "station.example.org");

        let status = manager.status().await;
        assert!(status.has_certificate);
        assert!(status.last_error.is_none());
        assert_eq!(manager.phase(Utc::now()).await, CertPhase::Issued);
    }

    #[tokio::test]
    async fn test_failure_records_error_and_keeps_old_material() {
        let manager = configured(Arc::new(FlakyAuthority::new(1, 90))).await;
        assert!(manager.request_certificate(false).await.is_err());
        let status = manager.status().await;
        assert!(!status.has_certificate);
        assert!(status.last_error.is_some());
        assert_eq!(manager.phase(Utc::now()).await, CertPhase::Failed);

        // Second attempt succeeds and clears the error.
        manager.request_certificate(false).await.unwrap();
        let status = manager.status().await;
        assert!(status.has_certificate);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_renewal_failure_keeps_serving_previous_cert() {
        let authority = Arc::new(FlakyAuthority::new(0, 90));
        let manager = configured(authority).await;
        manager.request_certificate(false).await.unwrap();

        // Renewal attempt against a now-failing authority.
        let failing = configured(Arc::new(FlakyAuthority::new(10, 90))).await;
        failing.request_certificate(false).await.unwrap_err();
        assert!(failing.status().await.last_error.is_some());

        // Original manager still serves its material.
        assert!(manager.valid_certificate(Utc::now()).await.is_some());
    }

    #[tokio::test]
    async fn test_renewal_due_inside_window() {
        let manager = configured(Arc::new(FlakyAuthority::new(0, 10))).await;
        manager.request_certificate(false).await.unwrap();

        // 10-day validity is inside the 30-day window.
        assert!(manager.renewal_due(Utc::now()).await);
        assert_eq!(manager.phase(Utc::now()).await, CertPhase::RenewalDue);
    }

    #[tokio::test]
    async fn test_not_due_with_long_validity() {
        let manager = configured(Arc::new(FlakyAuthority::new(0, 90))).await;
        manager.request_certificate(false).await.unwrap();
        assert!(!manager.renewal_due(Utc::now()).await);
    }

    #[tokio::test]
    async fn test_expired_cert_reported_not_discarded() {
        let manager = configured(Arc::new(FlakyAuthority::new(0, 90))).await;
        manager.request_certificate(false).await.unwrap();

        let future = Utc::now() + chrono::Duration::days(120);
        assert_eq!(manager.phase(future).await, CertPhase::Expired);
        // Still reported through status.
        assert!(manager.status().await.has_certificate);
        // But no longer valid for HTTPS gating.
        assert!(manager.valid_certificate(future).await.is_none());
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let manager =
            CertificateManager::with_timeout(Arc::new(HangingAuthority), Duration::from_millis(50));
        manager
            .configure(Some("d.example.org".into()), Some("a@b.com".into()), true)
            .await;

        let err = manager.request_certificate(false).await.unwrap_err();
        assert!(matches!(err, CertError::RequestFailed(_)));
        assert!(manager.status().await.last_error.is_some());
    }

    #[tokio::test]
    async fn test_auto_renew_disabled_never_due() {
        let manager = CertificateManager::new(Arc::new(FlakyAuthority::new(0, 5)));
        manager
            .configure(
                Some("d.example.org".into()),
                Some("a@b.com".into()),
                false,
            )
            .await;
        manager.request_certificate(false).await.unwrap();
        assert!(!manager.renewal_due(Utc::now()).await);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_for(0), Duration::ZERO);
        assert_eq!(backoff_for(1), Duration::from_secs(60));
        assert_eq!(backoff_for(2), Duration::from_secs(120));
        assert_eq!(backoff_for(3), Duration::from_secs(240));
        assert_eq!(backoff_for(30), Duration::from_secs(CERT_BACKOFF_MAX_SECS));
    }
}
