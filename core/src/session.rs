use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// An authenticated user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
        }
    }

    /// Display name for a new account: the given name, else the email's local part.
    #[must_use]
    pub fn profile_name(&self) -> Option<String> {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.email.as_deref().and_then(|e| e.split('@').next()))
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum State {
    /// Nothing reported by the auth provider yet.
    #[default]
    Unobserved,
    Guest,
    SignedIn(Identity),
}

/// Which entry point an auth observation maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Established(Identity),
    Cleared,
}

/// Current authentication state.
///
/// Changes only through [`Session::observe`], which turns auth-provider
/// reports into strictly alternating sign-in/sign-out transitions.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: State,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            State::SignedIn(identity) => Some(identity),
            State::Unobserved | State::Guest => None,
        }
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.identity().is_some()
    }

    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.state != State::Unobserved
    }

    /// Record an auth report and return the transition it causes, if any.
    ///
    /// Repeating the current state is not a transition (`Ok(None)`). Reporting a
    /// different user while one is signed in is an error: a sign-out must come
    /// first.
    pub fn observe(&mut self, reported: Option<Identity>) -> Result<Option<Transition>> {
        let next_state = match (&self.state, reported) {
            (State::SignedIn(current), Some(next)) if current.uid == next.uid => return Ok(None),
            (State::SignedIn(current), Some(next)) => bail!(
                "'{}' is still signed in; sign out before signing in as '{}'",
                current.uid,
                next.uid
            ),
            (State::Unobserved | State::Guest, Some(next)) => State::SignedIn(next),
            (State::Guest, None) => return Ok(None),
            (State::Unobserved | State::SignedIn(_), None) => State::Guest,
        };

        let transition = match &next_state {
            State::SignedIn(identity) => Transition::Established(identity.clone()),
            State::Unobserved | State::Guest => Transition::Cleared,
        };
        self.state = next_state;
        Ok(Some(transition))
    }
}
