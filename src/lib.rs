// Library root
// -----------
// This crate bulk-registers (or unregisters) users in ejudge contests
// through the `change-registration` API endpoint. The binary (`main.rs`)
// is a thin wrapper around `cli`.
//
// Module responsibilities:
// - `users`, `action`: parse the `--users`, `--contests` and `--action`
//   inputs into typed values.
// - `config`: load the JSON secrets file and resolve the API token.
// - `api`: the blocking HTTP client that sends one registration change.
// - `decode`: turn a response body (JSON, or JSON buried in an HTML error
//   page) into a reply and classify it.
// - `driver`: the contest × user loop that collects failures.
// - `cli`: flag definitions, logging setup and the top-level flow.
pub mod action;
pub mod api;
pub mod cli;
pub mod config;
pub mod decode;
pub mod driver;
pub mod error;
pub mod users;

pub use action::Action;
pub use api::ApiClient;
pub use error::RegistrationError;
pub use users::UserSpec;
