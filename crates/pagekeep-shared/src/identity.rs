use std::fmt;

use crate::constants::ROLE_AUTHENTICATED;

/// A verified caller, as handed to the store.
///
/// Only the server builds one, and only from a verified token's claims. The
/// store scopes every transaction it opens to exactly this subject and role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    subject: String,
    role: String,
}

impl Identity {
    pub fn new(subject: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            role: role.into(),
        }
    }

    /// Identity carrying the standard end-user role.
    pub fn authenticated(subject: impl Into<String>) -> Self {
        Self::new(subject, ROLE_AUTHENTICATED)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn role(&self) -> &str {
        &self.role
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.subject, self.role)
    }
}
