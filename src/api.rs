// API client module: a small blocking HTTP client for the ejudge
// `change-registration` endpoint. One call is one form-encoded POST; the
// client holds nothing mutable, so the driver can reuse it for every
// (contest, user) pair.

use crate::action::Action;
use crate::decode::{decode_reply, truncate_preview, RegistrationReply};
use crate::error::RegistrationError;
use crate::users::UserSpec;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, warn};

pub const CHANGE_REGISTRATION_PATH: &str = "/ej/api/v1/master/change-registration";

/// Blocking client bound to one ejudge installation and one API token.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl ApiClient {
    /// Build a client for `base_url` (already stripped of trailing `/`).
    ///
    /// `token` is sent verbatim as the `Authorization` header. Every
    /// request gets its own `timeout`. With `insecure` set, TLS
    /// certificates are not verified.
    pub fn new(base_url: &str, token: &str, timeout: Duration, insecure: bool) -> Result<Self> {
        if insecure {
            warn!("TLS certificate verification is disabled");
        }
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(insecure)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            base_url: base_url.to_string(),
            token: token.to_string(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, CHANGE_REGISTRATION_PATH)
    }

    /// Register or unregister `user` in `contest_id`.
    ///
    /// Succeeds only when the server acknowledges the change with both
    /// `ok` and `result` set. Transport failures, non-2xx statuses,
    /// unexpected content types, malformed JSON and negative replies all
    /// come back as [`RegistrationError`].
    pub fn change_registration(
        &self,
        contest_id: i64,
        user: &UserSpec,
        action: Action,
    ) -> Result<RegistrationReply, RegistrationError> {
        let url = self.endpoint();
        let form = registration_form(contest_id, user, action);
        debug!(%url, contest_id, user = %user, %action, "sending registration change");

        let res = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.token.as_str())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .form(&form)
            .send()
            .map_err(RegistrationError::Transport)?;

        let status = res.status();
        let status_line = status.to_string();
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
        let body = res.bytes().map_err(RegistrationError::ReadBody)?;

        if !status.is_success() {
            return Err(RegistrationError::Status {
                status: status_line,
                preview: truncate_preview(&String::from_utf8_lossy(&body)),
            });
        }

        debug!(status = %status_line, content_type = ?content_type, "received reply");
        decode_reply(&body, content_type.as_deref(), &status_line)?.check()
    }
}

/// Form fields for one registration change.
pub fn registration_form(
    contest_id: i64,
    user: &UserSpec,
    action: Action,
) -> Vec<(&'static str, String)> {
    let mut form = Vec::with_capacity(7);
    if let Some(id) = user.id {
        form.push(("other_user_id", id.to_string()));
    }
    if !user.login.is_empty() {
        form.push(("other_user_login", user.login.clone()));
    }
    form.push(("contest_id", contest_id.to_string()));
    form.push(("op", action.op().to_string()));
    if action == Action::Register {
        form.push(("status", "ok".to_string()));
        form.push(("name", user.name.clone()));
    }
    form.push(("ignore", "true".to_string()));
    form
}
