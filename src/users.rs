// List parsing: turns the raw `--users` and `--contests` strings into
// typed records. Both lists accept `;` or `,` as separators and ignore
// blank entries, so `1:Alice; ,bob:Bob` is two users.

use std::fmt;
use thiserror::Error;

/// Errors produced while parsing user or contest lists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("user list is empty")]
    EmptyUsers,
    #[error("contest list is empty")]
    EmptyContests,
    #[error("invalid user specification {0:?}")]
    MissingSeparator(String),
    #[error("user identifier is empty in {0:?}")]
    EmptyIdentifier(String),
    #[error("user name is empty in {0:?}")]
    EmptyName(String),
    #[error("invalid contest ID {token:?}: {reason}")]
    InvalidContest { token: String, reason: String },
    #[error("unsupported action {0:?}")]
    UnsupportedAction(String),
}

/// One user to (un)register. `login` is always the identifier exactly as
/// given; `id` is filled in as well when that identifier is an integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub id: Option<i64>,
    pub login: String,
    pub name: String,
}

impl UserSpec {
    /// Human readable identifier used in log lines and failure reports.
    pub fn identifier(&self) -> String {
        match (self.login.is_empty(), self.id) {
            (false, Some(id)) => format!("login={} (id={})", self.login, id),
            (true, Some(id)) => format!("id={}", id),
            (false, None) => format!("login={}", self.login),
            (true, None) => "<unknown>".to_string(),
        }
    }
}

impl fmt::Display for UserSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// Split on `;` or `,`, trim every piece and drop the empty ones.
pub fn split_list(raw: &str) -> Vec<&str> {
    raw.split([';', ','])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse `identifier:name` pairs, keeping input order.
pub fn parse_users(raw: &str) -> Result<Vec<UserSpec>, ParseError> {
    let items = split_list(raw);
    if items.is_empty() {
        return Err(ParseError::EmptyUsers);
    }

    items
        .into_iter()
        .map(|item| {
            let (ident, name) = item
                .split_once(':')
                .ok_or_else(|| ParseError::MissingSeparator(item.to_string()))?;
            let ident = ident.trim();
            let name = name.trim();
            if ident.is_empty() {
                return Err(ParseError::EmptyIdentifier(item.to_string()));
            }
            if name.is_empty() {
                return Err(ParseError::EmptyName(item.to_string()));
            }
            Ok(UserSpec {
                id: ident.parse().ok(),
                login: ident.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

/// Parse a list of integer contest IDs. A single bad token fails the
/// whole list.
pub fn parse_contest_ids(raw: &str) -> Result<Vec<i64>, ParseError> {
    let items = split_list(raw);
    if items.is_empty() {
        return Err(ParseError::EmptyContests);
    }

    items
        .into_iter()
        .map(|item| {
            item.parse::<i64>()
                .map_err(|err| ParseError::InvalidContest {
                    token: item.to_string(),
                    reason: err.to_string(),
                })
        })
        .collect()
}
