//! Session - registers the hook, serves deliveries, cleans up.
//!
//! # Lifecycle
//!
//! 1. Validate configuration and resolve the callback URL and secret
//! 2. Create the webhook (nothing is bound if this fails)
//! 3. Bind the HTTP listener, and the HTTPS listener when TLS is enabled
//! 4. Serve until cancelled or a listener fails
//! 5. [`RunningSession::cleanup`]: drain listeners and handlers within the
//!    grace period, then delete the hook within its own timeout
//!
//! Cleanup is idempotent and must be called on every exit path.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use reqwest::Url;
use secrecy::SecretString;
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::adapters::acme::{AcmeIssuer, CertificateProvider, ChallengeStore, FileCertificateStore};
use crate::adapters::http::{bootstrap_router, callback_router, listener, CallbackState, Dispatcher};
use crate::adapters::secrets::RandomSecretSource;
use crate::config::{ResponderConfig, ValidationError};
use crate::domain::{DeliveryVerifier, EventFilter, SessionState, SessionTransition};
use crate::ports::{
    CertificateIssuer, CertificateStore, CreateHookRequest, DeliveryHandler, SecretSource,
    WebhookRegistration, WebhookRegistry,
};

use super::error::ResponderError;

/// Path prefix of generated callback URLs.
pub const CALLBACK_PATH_PREFIX: &str = "/gh-callback/";

/// Margin on top of the grace period before listener tasks are aborted.
const LISTENER_ABORT_MARGIN: Duration = Duration::from_secs(1);

// ════════════════════════════════════════════════════════════════════════════
// Session (not started)
// ════════════════════════════════════════════════════════════════════════════

/// A responder session, configured but not yet started.
pub struct Session {
    config: ResponderConfig,
    registry: Arc<dyn WebhookRegistry>,
    handler: Arc<dyn DeliveryHandler>,
    secrets: Arc<dyn SecretSource>,
    certificate_store: Option<Arc<dyn CertificateStore>>,
    certificate_issuer: Option<Arc<dyn CertificateIssuer>>,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
}

impl Session {
    pub fn new(
        config: ResponderConfig,
        registry: Arc<dyn WebhookRegistry>,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            registry,
            handler,
            secrets: Arc::new(RandomSecretSource),
            certificate_store: None,
            certificate_issuer: None,
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Source of generated hook secrets and callback tokens.
    pub fn with_secret_source(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Tie the session to an outer cancellation token. Cancelling it stops
    /// startup, or ends [`RunningSession::wait`] once serving.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Replace the on-disk certificate cache.
    pub fn with_certificate_store(mut self, store: Arc<dyn CertificateStore>) -> Self {
        self.certificate_store = Some(store);
        self
    }

    /// Replace the ACME issuer.
    pub fn with_certificate_issuer(mut self, issuer: Arc<dyn CertificateIssuer>) -> Self {
        self.certificate_issuer = Some(issuer);
        self
    }

    /// Observe state changes, including those of a failed start.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Register the hook and start serving.
    ///
    /// On error nothing is left behind: no listener is bound and any hook
    /// that was created has been deleted.
    pub async fn start(self) -> Result<RunningSession, ResponderError> {
        let span = tracing::info_span!("session", repo = %self.config.github.repo);
        transition(&self.state, SessionTransition::Start);

        let result = self.start_inner().instrument(span.clone()).await;
        match result {
            Ok(running) => Ok(running),
            Err((state, e)) => {
                transition(&state, SessionTransition::RegistrationFailed);
                span.in_scope(|| tracing::error!(error = %e, "Session failed to start"));
                Err(e)
            }
        }
    }

    async fn start_inner(
        self,
    ) -> Result<RunningSession, (watch::Sender<SessionState>, ResponderError)> {
        let Session {
            config,
            registry,
            handler,
            secrets,
            certificate_store,
            certificate_issuer,
            cancel,
            state,
        } = self;

        let prepared = match prepare(&config, secrets.as_ref()) {
            Ok(prepared) => prepared,
            Err(e) => return Err((state, e)),
        };

        let tls = if config.tls.enabled {
            let challenges = ChallengeStore::new();
            let store = certificate_store
                .unwrap_or_else(|| Arc::new(FileCertificateStore::new(&config.tls.cache_path)));
            let issuer = certificate_issuer.unwrap_or_else(|| {
                Arc::new(AcmeIssuer::new(
                    &config.tls,
                    store.clone(),
                    challenges.clone(),
                    cancel.clone(),
                ))
            });
            match CertificateProvider::new(&config.tls, store, issuer) {
                Ok(provider) => Some((Arc::new(provider), challenges)),
                Err(e) => return Err((state, e.into())),
            }
        } else {
            None
        };

        let (owner, repo) = match config.github.owner_and_name() {
            Ok(parts) => parts,
            Err(e) => return Err((state, e.into())),
        };
        let request = CreateHookRequest {
            owner: owner.to_string(),
            repo: repo.to_string(),
            callback_url: prepared.callback_url.clone(),
            secret: prepared.secret.clone(),
            events: prepared.filter.as_slice().to_vec(),
        };

        let registration = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err((state, ResponderError::Cancelled)),
            created = registry.create(&request) => match created {
                Ok(registration) => registration,
                Err(e) => return Err((state, e.into())),
            },
        };

        let delete_timeout = config.github.delete_timeout();
        let http_listener = match bind(config.server.http_addr()).await {
            Ok(l) => l,
            Err(e) => {
                delete_hook(registry.as_ref(), &registration, delete_timeout).await;
                return Err((state, e));
            }
        };
        let https_listener = if tls.is_some() {
            match bind(config.server.https_addr()).await {
                Ok(l) => Some(l),
                Err(e) => {
                    drop(http_listener);
                    delete_hook(registry.as_ref(), &registration, delete_timeout).await;
                    return Err((state, e));
                }
            }
        } else {
            None
        };

        let http_addr = local_addr(&http_listener);
        let https_addr = https_listener.as_ref().map(local_addr);

        let dispatcher = Dispatcher::new(handler);
        let callback = callback_router(
            &prepared.callback_path,
            CallbackState::new(
                DeliveryVerifier::new(prepared.secret),
                prepared.filter,
                dispatcher.clone(),
            ),
            config.server.max_body_bytes,
        );

        let grace = config.server.grace_period();
        let fatal = Arc::new(StdMutex::new(None));
        let mut listeners = Vec::new();

        match (tls, https_listener) {
            (Some((provider, challenges)), Some(https_listener)) => {
                let bootstrap =
                    bootstrap_router(challenges, &prepared.callback_path, &prepared.callback_url);
                listeners.push(spawn_listener(http_listener, bootstrap, None, &cancel, grace, &fatal));
                listeners.push(spawn_listener(
                    https_listener,
                    callback,
                    Some(provider),
                    &cancel,
                    grace,
                    &fatal,
                ));
            }
            _ => {
                listeners.push(spawn_listener(http_listener, callback, None, &cancel, grace, &fatal));
            }
        }

        transition(&state, SessionTransition::ServingStarted);
        tracing::info!(
            hook_id = registration.id,
            callback_url = %registration.callback_url,
            http_addr = %http_addr,
            https_addr = ?https_addr,
            "Responder started"
        );

        Ok(RunningSession {
            inner: Arc::new(Inner {
                registration,
                registry,
                state,
                cancel,
                listeners: Mutex::new(listeners),
                dispatcher,
                grace,
                delete_timeout,
                fatal,
                cleaned: OnceCell::new(),
                http_addr,
                https_addr,
            }),
        })
    }
}

/// Values resolved before contacting GitHub.
struct Prepared {
    callback_url: String,
    callback_path: String,
    secret: SecretString,
    filter: EventFilter,
}

fn prepare(config: &ResponderConfig, secrets: &dyn SecretSource) -> Result<Prepared, ResponderError> {
    config.validate()?;

    let callback_url = match &config.github.callback_url {
        Some(url) => url.clone(),
        None => {
            let host = config.tls.domain.trim();
            if host.is_empty() {
                return Err(ValidationError::MissingRequired("TLS__DOMAIN or GITHUB__CALLBACK_URL").into());
            }
            format!(
                "{}://{}{}{}",
                config.scheme(),
                host,
                CALLBACK_PATH_PREFIX,
                secrets.callback_token()
            )
        }
    };
    let callback_path = Url::parse(&callback_url)
        .map_err(|_| ValidationError::InvalidCallbackUrl(callback_url.clone()))?
        .path()
        .to_string();

    let secret = config
        .github
        .secret
        .clone()
        .unwrap_or_else(|| secrets.hook_secret());

    Ok(Prepared {
        callback_url,
        callback_path,
        secret,
        filter: EventFilter::new(config.github.events.iter()),
    })
}

async fn bind(
    addr: Result<SocketAddr, ValidationError>,
) -> Result<tokio::net::TcpListener, ResponderError> {
    let addr = addr?;
    listener::bind(addr)
        .await
        .map_err(|e| ResponderError::listener(addr, e))
}

fn local_addr(listener: &tokio::net::TcpListener) -> SocketAddr {
    listener
        .local_addr()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
}

fn spawn_listener(
    tcp: tokio::net::TcpListener,
    router: axum::Router,
    tls: Option<Arc<CertificateProvider>>,
    cancel: &CancellationToken,
    grace: Duration,
    fatal: &Arc<StdMutex<Option<ResponderError>>>,
) -> JoinHandle<()> {
    let addr = local_addr(&tcp);
    let cancel = cancel.clone();
    let fatal = Arc::clone(fatal);
    let span = tracing::info_span!("listener", addr = %addr, tls = tls.is_some());

    tokio::spawn(
        async move {
            if let Err(e) = listener::serve(tcp, router, tls, cancel.clone(), grace).await {
                tracing::error!(error = %e, "Listener failed, stopping session");
                let mut slot = fatal.lock().unwrap_or_else(|e| e.into_inner());
                slot.get_or_insert(ResponderError::listener(addr, e));
                cancel.cancel();
            }
        }
        .instrument(span),
    )
}

async fn delete_hook(
    registry: &dyn WebhookRegistry,
    registration: &WebhookRegistration,
    delete_timeout: Duration,
) {
    match tokio::time::timeout(delete_timeout, registry.delete(registration)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(
            hook_id = registration.id,
            error = %e,
            "Failed to delete webhook, it may need to be removed by hand"
        ),
        Err(_) => tracing::warn!(
            hook_id = registration.id,
            timeout_secs = delete_timeout.as_secs(),
            "Timed out deleting webhook, it may need to be removed by hand"
        ),
    }
}

fn transition(state: &watch::Sender<SessionState>, transition: SessionTransition) {
    state.send_if_modified(|current| match current.apply(transition) {
        Ok(next) => {
            tracing::debug!(from = %current, to = %next, "Session state changed");
            *current = next;
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Ignoring invalid session transition");
            false
        }
    });
}

// ════════════════════════════════════════════════════════════════════════════
// RunningSession
// ════════════════════════════════════════════════════════════════════════════

/// A serving session. Cheap to clone; all clones share one cleanup.
#[derive(Clone)]
pub struct RunningSession {
    inner: Arc<Inner>,
}

struct Inner {
    registration: WebhookRegistration,
    registry: Arc<dyn WebhookRegistry>,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    dispatcher: Dispatcher,
    grace: Duration,
    delete_timeout: Duration,
    fatal: Arc<StdMutex<Option<ResponderError>>>,
    cleaned: OnceCell<()>,
    http_addr: SocketAddr,
    https_addr: Option<SocketAddr>,
}

impl fmt::Debug for RunningSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningSession")
            .field("hook_id", &self.inner.registration.id)
            .field("callback_url", &self.inner.registration.callback_url)
            .field("http_addr", &self.inner.http_addr)
            .field("https_addr", &self.inner.https_addr)
            .finish_non_exhaustive()
    }
}

impl RunningSession {
    pub fn registration(&self) -> &WebhookRegistration {
        &self.inner.registration
    }

    pub fn callback_url(&self) -> &str {
        &self.inner.registration.callback_url
    }

    /// Bound address of the plain-HTTP listener.
    pub fn http_addr(&self) -> SocketAddr {
        self.inner.http_addr
    }

    /// Bound address of the TLS listener, when TLS is enabled.
    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.inner.https_addr
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Token cancelled when the session stops serving.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Resolves once serving ends.
    ///
    /// Returns the listener error if one caused it. Cleanup still has to be
    /// called afterwards.
    pub async fn wait(&self) -> Result<(), ResponderError> {
        self.inner.cancel.cancelled().await;
        let mut slot = self.inner.fatal.lock().unwrap_or_else(|e| e.into_inner());
        match slot.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop serving and delete the hook. Only the first call does anything;
    /// concurrent callers wait for it to finish.
    pub async fn cleanup(&self) {
        let inner = &self.inner;
        inner.cleaned.get_or_init(|| inner.run_cleanup()).await;
    }
}

impl Inner {
    async fn run_cleanup(&self) {
        transition(&self.state, SessionTransition::Stop);
        tracing::info!(hook_id = self.registration.id, "Shutting down");
        self.cancel.cancel();

        let listeners = std::mem::take(&mut *self.listeners.lock().await);
        let drain_listeners = async {
            for mut handle in listeners {
                match tokio::time::timeout(self.grace + LISTENER_ABORT_MARGIN, &mut handle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Listener task ended abnormally"),
                    Err(_) => {
                        tracing::warn!("Listener did not stop in time, aborting");
                        handle.abort();
                    }
                }
            }
        };
        tokio::join!(drain_listeners, self.dispatcher.drain(self.grace));

        delete_hook(self.registry.as_ref(), &self.registration, self.delete_timeout).await;

        transition(&self.state, SessionTransition::Cleaned);
        tracing::info!(hook_id = self.registration.id, "Session stopped");
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.cleaned.get().is_none() {
            tracing::warn!(
                hook_id = self.registration.id,
                "Session dropped without cleanup, webhook may remain registered"
            );
            self.cancel.cancel();
        }
    }
}
