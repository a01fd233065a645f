//! Push registration and serverless-function plumbing.
//!
//! # Responsibility
//! - Define the narrow collaborator traits for identity and backend calls.
//! - Keep device token registration in sync with the signed-in identity.
//! - Wrap the serverless functions behind `{success, error}` results.
//!
//! # Invariants
//! - Registration failures never propagate; they surface as outcomes.
//! - Function calls never panic or return `Err` to UI-facing callers.

use crate::events::listeners::{ListenerSet, Subscription};
use crate::model::notification::{DeviceToken, Platform};
use crate::model::task::UserId;
use serde_json::Value;
use std::cell::Cell;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod functions;
pub mod registration;

pub use functions::{CheckoutOutcome, PushPayload, SendResult};
pub use registration::{PushRegistrationManager, RegistrationOutcome, SkipReason};

/// Transport-level failure talking to the managed backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    Unauthenticated,
    Network(String),
    Server { status: u16, message: String },
    InvalidResponse(String),
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "no authenticated session"),
            Self::Network(message) => write!(f, "network error: {message}"),
            Self::Server { status, message } => write!(f, "server error {status}: {message}"),
            Self::InvalidResponse(message) => write!(f, "invalid response: {message}"),
        }
    }
}

impl Error for BackendError {}

/// Raw reply of a serverless function invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionReply {
    pub status: u16,
    pub body: Value,
}

impl FunctionReply {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Managed backend calls used by the core.
pub trait PushBackend {
    /// Idempotent upsert of `(user, token)`.
    fn upsert_device_token(
        &self,
        user_id: UserId,
        token: &DeviceToken,
        platform: Platform,
    ) -> Result<(), BackendError>;
    fn remove_device_token(&self, user_id: UserId, token: &DeviceToken)
        -> Result<(), BackendError>;
    /// Invokes a serverless function with a JSON body.
    fn invoke_function(&self, name: &str, body: &Value) -> Result<FunctionReply, BackendError>;
}

/// Sign-in/sign-out transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChange {
    SignedIn(UserId),
    SignedOut,
}

/// Session provider the registration manager scopes its calls with.
pub trait IdentityProvider {
    fn current_user(&self) -> Option<UserId>;
    fn on_auth_change(&self, listener: Box<dyn FnMut(&AuthChange)>) -> Subscription;
}

/// In-process identity provider driven by the host's auth callbacks.
pub struct AuthChannel {
    current: Cell<Option<UserId>>,
    listeners: ListenerSet<AuthChange>,
}

impl Default for AuthChannel {
    fn default() -> Self {
        Self::new(None)
    }
}

impl AuthChannel {
    pub fn new(current: Option<UserId>) -> Self {
        Self {
            current: Cell::new(current),
            listeners: ListenerSet::new("auth_change"),
        }
    }

    pub fn sign_in(&self, user_id: UserId) {
        self.current.set(Some(user_id));
        self.listeners.emit(&AuthChange::SignedIn(user_id));
    }

    /// Emits only on an actual transition from signed in.
    pub fn sign_out(&self) {
        if self.current.replace(None).is_none() {
            return;
        }
        self.listeners.emit(&AuthChange::SignedOut);
    }
}

impl IdentityProvider for AuthChannel {
    fn current_user(&self) -> Option<UserId> {
        self.current.get()
    }

    fn on_auth_change(&self, listener: Box<dyn FnMut(&AuthChange)>) -> Subscription {
        self.listeners.subscribe(listener)
    }
}
