//! Serverless function envelopes.
//!
//! Every function takes a JSON body and answers `{success, error?}`; non-2xx
//! replies carry `{error: message}`. Failures are folded into the returned
//! result instead of being raised.

use crate::model::task::{TaskId, UserId};
use crate::push::{BackendError, FunctionReply, PushBackend};
use crate::scheduler::sweep::DueReminderBatch;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const SEND_PUSH_FUNCTION: &str = "send-push-notification";
pub const WELCOME_EMAIL_FUNCTION: &str = "send-welcome-email";
pub const CHECKOUT_FUNCTION: &str = "create-checkout-session";
pub const REMINDER_SWEEP_FUNCTION: &str = "send-reminders";

/// `{success, error?}` envelope returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Push message addressed to a user's registered devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,
}

impl PushPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            task_id: None,
            deep_link: None,
        }
    }
}

/// Result of `create-checkout-session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Checkout session request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

pub fn send_push(backend: &dyn PushBackend, user_id: UserId, payload: &PushPayload) -> SendResult {
    let body = json!({
        "user_id": user_id,
        "title": payload.title,
        "body": payload.body,
        "task_id": payload.task_id,
        "deep_link": payload.deep_link,
    });
    interpret_reply(
        SEND_PUSH_FUNCTION,
        backend.invoke_function(SEND_PUSH_FUNCTION, &body),
    )
}

pub fn send_welcome_email(
    backend: &dyn PushBackend,
    email: &str,
    display_name: Option<&str>,
) -> SendResult {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return SendResult::failed("a valid email address is required");
    }
    let body = json!({ "email": email, "name": display_name });
    interpret_reply(
        WELCOME_EMAIL_FUNCTION,
        backend.invoke_function(WELCOME_EMAIL_FUNCTION, &body),
    )
}

pub fn create_checkout_session(
    backend: &dyn PushBackend,
    request: &CheckoutRequest,
) -> CheckoutOutcome {
    let body = match serde_json::to_value(request) {
        Ok(body) => body,
        Err(err) => {
            return CheckoutOutcome {
                success: false,
                url: None,
                error: Some(err.to_string()),
            }
        }
    };
    let reply = backend.invoke_function(CHECKOUT_FUNCTION, &body);
    let url = reply
        .as_ref()
        .ok()
        .and_then(|reply| reply.body.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let result = interpret_reply(CHECKOUT_FUNCTION, reply);

    match (result.success, url) {
        (true, Some(url)) => CheckoutOutcome {
            success: true,
            url: Some(url),
            error: None,
        },
        (true, None) => CheckoutOutcome {
            success: false,
            url: None,
            error: Some("checkout session response is missing `url`".to_string()),
        },
        (false, _) => CheckoutOutcome {
            success: false,
            url: None,
            error: result.error,
        },
    }
}

/// Hands the selected due-soon batches to the email reminder function.
pub fn trigger_reminder_sweep(
    backend: &dyn PushBackend,
    batches: &[DueReminderBatch],
) -> SendResult {
    if batches.is_empty() {
        info!("event=reminder_sweep module=push status=skipped reason=nothing_due");
        return SendResult::ok();
    }
    let body = json!({ "batches": batches });
    interpret_reply(
        REMINDER_SWEEP_FUNCTION,
        backend.invoke_function(REMINDER_SWEEP_FUNCTION, &body),
    )
}

/// Maps a raw function reply to the `{success, error}` envelope.
pub fn interpret_reply(name: &str, reply: Result<FunctionReply, BackendError>) -> SendResult {
    let result = match reply {
        Err(err) => SendResult::failed(err.to_string()),
        Ok(reply) if !reply.is_success_status() => SendResult::failed(
            error_message(&reply.body)
                .unwrap_or_else(|| format!("{name} failed with status {}", reply.status)),
        ),
        Ok(reply) => match reply.body.get("success").and_then(Value::as_bool) {
            Some(false) => SendResult::failed(
                error_message(&reply.body).unwrap_or_else(|| format!("{name} reported failure")),
            ),
            _ => SendResult::ok(),
        },
    };

    match &result.error {
        None => info!("event=function_invoke module=push status=ok function={name}"),
        Some(error) => warn!(
            "event=function_invoke module=push status=error function={name} error={error}"
        ),
    }
    result
}

fn error_message(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}
