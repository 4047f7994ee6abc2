use crate::users::ParseError;
use std::fmt;
use std::str::FromStr;

/// What to do with every (contest, user) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Register,
    Unregister,
}

impl Action {
    /// Past-tense verb for success log lines.
    pub fn verb(self) -> &'static str {
        match self {
            Action::Register => "Registered",
            Action::Unregister => "Unregistered",
        }
    }

    /// Value of the `op` form field understood by the server.
    pub fn op(self) -> &'static str {
        match self {
            Action::Register => "upsert",
            Action::Unregister => "delete",
        }
    }
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "register" => Ok(Action::Register),
            "unregister" => Ok(Action::Unregister),
            _ => Err(ParseError::UnsupportedAction(raw.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Register => "register",
            Action::Unregister => "unregister",
        })
    }
}
