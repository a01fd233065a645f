//! Device token lifecycle bound to the signed-in identity.

use crate::bridge::NativeBridge;
use crate::model::notification::{DeviceToken, Platform};
use crate::model::task::UserId;
use crate::push::functions::{self, PushPayload, SendResult};
use crate::push::{IdentityProvider, PushBackend};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::rc::Rc;

/// Why a registration call made no server request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotNative,
    NoToken,
    SignedOut,
    NothingRegistered,
}

/// Explicit result of a best-effort registration call.
///
/// Callers may inspect or ignore it; failures are already logged.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "registration outcome reports failures that were swallowed"]
pub enum RegistrationOutcome {
    /// Token upserted; `refreshed` when the same pair was already registered.
    Registered { refreshed: bool },
    /// Token disassociated from the identity.
    Cleared,
    Skipped(SkipReason),
    Failed(String),
}

impl RegistrationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Registration {
    user_id: UserId,
    token: DeviceToken,
    platform: Platform,
}

/// Keeps server-side device tokens in sync with identity and token changes.
pub struct PushRegistrationManager {
    backend: Rc<dyn PushBackend>,
    identity: Rc<dyn IdentityProvider>,
    registered: RefCell<Option<Registration>>,
}

impl PushRegistrationManager {
    pub fn new(backend: Rc<dyn PushBackend>, identity: Rc<dyn IdentityProvider>) -> Self {
        Self {
            backend,
            identity,
            registered: RefCell::new(None),
        }
    }

    /// Idempotent upsert of `token` for the current identity.
    pub fn register_token(&self, token: &DeviceToken, platform: Platform) -> RegistrationOutcome {
        let Some(user_id) = self.identity.current_user() else {
            debug!("event=push_register module=push status=skipped reason=signed_out");
            return RegistrationOutcome::Skipped(SkipReason::SignedOut);
        };

        let refreshed = self
            .registered
            .borrow()
            .as_ref()
            .is_some_and(|current| current.user_id == user_id && &current.token == token);

        match self.backend.upsert_device_token(user_id, token, platform) {
            Ok(()) => {
                info!(
                    "event=push_register module=push status=ok platform={} token={} refreshed={}",
                    platform.as_str(),
                    token.redacted(),
                    refreshed
                );
                *self.registered.borrow_mut() = Some(Registration {
                    user_id,
                    token: token.clone(),
                    platform,
                });
                RegistrationOutcome::Registered { refreshed }
            }
            Err(err) => {
                warn!(
                    "event=push_register module=push status=error platform={} token={} error={err}",
                    platform.as_str(),
                    token.redacted()
                );
                RegistrationOutcome::Failed(err.to_string())
            }
        }
    }

    /// Registers the bridge's existing token, if any.
    pub fn initialize(&self, bridge: &dyn NativeBridge) -> RegistrationOutcome {
        if !bridge.is_native() {
            debug!("event=push_initialize module=push status=skipped reason=not_native");
            return RegistrationOutcome::Skipped(SkipReason::NotNative);
        }
        match bridge.current_token() {
            Some(token) => self.register_token(&token, bridge.platform()),
            None => {
                debug!("event=push_initialize module=push status=skipped reason=no_token");
                RegistrationOutcome::Skipped(SkipReason::NoToken)
            }
        }
    }

    /// Disassociates the last registered token server-side.
    ///
    /// The local token is kept; only the identity binding is removed.
    pub fn cleanup(&self) -> RegistrationOutcome {
        let Some(registration) = self.registered.borrow_mut().take() else {
            debug!("event=push_cleanup module=push status=skipped reason=nothing_registered");
            return RegistrationOutcome::Skipped(SkipReason::NothingRegistered);
        };

        match self
            .backend
            .remove_device_token(registration.user_id, &registration.token)
        {
            Ok(()) => {
                info!(
                    "event=push_cleanup module=push status=ok platform={} token={}",
                    registration.platform.as_str(),
                    registration.token.redacted()
                );
                RegistrationOutcome::Cleared
            }
            Err(err) => {
                warn!(
                    "event=push_cleanup module=push status=error token={} error={err}",
                    registration.token.redacted()
                );
                RegistrationOutcome::Failed(err.to_string())
            }
        }
    }

    /// Server-mediated push to the current identity's devices. Never errors.
    pub fn send_to_current_user(&self, payload: &PushPayload) -> SendResult {
        match self.identity.current_user() {
            Some(user_id) => functions::send_push(self.backend.as_ref(), user_id, payload),
            None => {
                warn!("event=push_send module=push status=error error=signed_out");
                SendResult::failed("not signed in")
            }
        }
    }

    pub fn registered_token(&self) -> Option<DeviceToken> {
        self.registered
            .borrow()
            .as_ref()
            .map(|registration| registration.token.clone())
    }

    pub fn backend(&self) -> &Rc<dyn PushBackend> {
        &self.backend
    }
}
