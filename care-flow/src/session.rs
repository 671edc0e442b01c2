use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::events::{EventBus, StoreEvent};

/// Identity supplied by the auth provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Bearer credential issued by the auth provider. Never inspected, only forwarded.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

#[derive(Debug, Default)]
struct SessionState {
    user: Option<AppUser>,
    token: Option<BearerToken>,
}

/// Current authentication session
#[derive(Debug)]
pub struct SessionStore {
    state: RwLock<SessionState>,
    events: EventBus,
}

impl SessionStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: RwLock::new(SessionState::default()),
            events,
        }
    }

    pub fn set_auth(&self, user: Option<AppUser>, token: Option<BearerToken>) {
        let authenticated = user.is_some();
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.user = user;
            state.token = token;
        }
        self.events
            .publish(StoreEvent::SessionChanged { authenticated });
    }

    pub fn clear_auth(&self) {
        self.set_auth(None, None);
    }

    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .is_some()
    }

    pub fn user(&self) -> Option<AppUser> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .clone()
    }

    pub fn token(&self) -> Option<BearerToken> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_follows_user_presence() {
        let store = SessionStore::new(EventBus::new());
        assert!(!store.is_authenticated());

        let user = AppUser {
            id: "u1".to_string(),
            email: "doc@example.org".to_string(),
            name: "doc".to_string(),
        };
        store.set_auth(Some(user.clone()), Some(BearerToken::new("secret")));
        assert!(store.is_authenticated());
        assert_eq!(store.user(), Some(user));
        assert_eq!(store.token().unwrap().expose(), "secret");

        store.clear_auth();
        assert!(!store.is_authenticated());
        assert!(store.token().is_none());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = BearerToken::new("secret");
        assert_eq!(format!("{:?}", token), "BearerToken(***)");
    }
}
