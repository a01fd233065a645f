//! Native bridge adapter.
//!
//! # Responsibility
//! - Expose one capability surface whether or not the app runs inside a
//!   native shell.
//! - Keep vendor-SDK-shaped notification calls behind `PlatformNotifier`.
//!
//! # Invariants
//! - Outside a native shell every scheduling call is a no-op and capability
//!   queries report "not native".
//! - Scheduling is fire-and-forget; platform errors are logged, not returned.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

mod native;
mod web;

pub use native::{NativeBridge, NativeShell, PlatformNotifier};
pub use web::WebBridge;

/// Failure reported by a platform notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The user refused notification permission.
    PermissionDenied,
    /// The platform API is not reachable from this runtime.
    Unavailable,
    /// Platform SDK rejected the call.
    Platform(String),
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "notification permission denied"),
            Self::Unavailable => write!(f, "notification platform unavailable"),
            Self::Platform(message) => write!(f, "platform notification error: {message}"),
        }
    }
}

impl Error for BridgeError {}

/// Result of the capability probe.
pub enum DetectedBridge<N> {
    Native(Rc<NativeShell<N>>),
    Web(Rc<WebBridge>),
}

impl<N: PlatformNotifier + 'static> DetectedBridge<N> {
    /// Type-erased handle for consumers that only need the capability surface.
    pub fn as_bridge(&self) -> Rc<dyn NativeBridge> {
        match self {
            Self::Native(shell) => Rc::clone(shell) as Rc<dyn NativeBridge>,
            Self::Web(web) => Rc::clone(web) as Rc<dyn NativeBridge>,
        }
    }

    /// Concrete shell, used by the host to forward platform callbacks.
    pub fn native_shell(&self) -> Option<&Rc<NativeShell<N>>> {
        match self {
            Self::Native(shell) => Some(shell),
            Self::Web(_) => None,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native(_))
    }
}

/// Probes for a usable native notifier.
///
/// Returns the native adapter only when a notifier exists and reports itself
/// available at runtime; everything else gets the web null object.
pub fn detect_bridge<N: PlatformNotifier + 'static>(notifier: Option<N>) -> DetectedBridge<N> {
    match notifier {
        Some(notifier) if notifier.is_available() => {
            log::info!(
                "event=bridge_detect module=bridge status=ok native=true platform={}",
                notifier.platform().as_str()
            );
            DetectedBridge::Native(Rc::new(NativeShell::new(notifier)))
        }
        Some(_) => {
            log::info!(
                "event=bridge_detect module=bridge status=ok native=false reason=notifier_unavailable"
            );
            DetectedBridge::Web(Rc::new(WebBridge::new()))
        }
        None => {
            log::info!("event=bridge_detect module=bridge status=ok native=false reason=no_notifier");
            DetectedBridge::Web(Rc::new(WebBridge::new()))
        }
    }
}
