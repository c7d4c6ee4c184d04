use std::collections::HashMap;
use system::UserId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no credential was presented")]
    MissingCredential,
    #[error("credential is not recognized")]
    UnknownCredential,
    #[error("invalid token entry {0:?}, expected <token>=<user id>")]
    InvalidEntry(String),
}

/// Validates the credential a connection presents at handshake time.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credential: Option<&str>) -> Result<UserId, AuthError>;
}

/// Accepts any non-empty credential and uses it as the user id.
pub struct OpenAuthenticator;

impl Authenticator for OpenAuthenticator {
    fn authenticate(&self, credential: Option<&str>) -> Result<UserId, AuthError> {
        match credential.map(str::trim) {
            Some(user_id) if !user_id.is_empty() => Ok(user_id.to_string()),
            _ => Err(AuthError::MissingCredential),
        }
    }
}

/// Static token table, `token -> user id`.
pub struct TokenAuthenticator {
    tokens: HashMap<String, UserId>,
}

impl TokenAuthenticator {
    /// Parses `<token>=<user id>` entries.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self, AuthError> {
        let mut tokens = HashMap::new();
        for entry in entries {
            let entry = entry.as_ref();
            match entry.split_once('=') {
                Some((token, user_id)) if !token.is_empty() && !user_id.is_empty() => {
                    tokens.insert(token.to_string(), user_id.to_string());
                }
                _ => return Err(AuthError::InvalidEntry(entry.to_string())),
            }
        }
        Ok(Self { tokens })
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, credential: Option<&str>) -> Result<UserId, AuthError> {
        let token = credential.ok_or(AuthError::MissingCredential)?;
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::UnknownCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_authenticator_uses_credential_as_user() {
        assert_eq!(OpenAuthenticator.authenticate(Some("alice")).unwrap(), "alice");
        assert_eq!(
            OpenAuthenticator.authenticate(Some("  ")),
            Err(AuthError::MissingCredential)
        );
        assert_eq!(
            OpenAuthenticator.authenticate(None),
            Err(AuthError::MissingCredential)
        );
    }

    #[test]
    fn token_authenticator_maps_tokens_to_users() {
        let auth = TokenAuthenticator::from_entries(&["s3cret=alice", "hunter2=bob"]).unwrap();
        assert_eq!(auth.authenticate(Some("hunter2")).unwrap(), "bob");
        assert_eq!(
            auth.authenticate(Some("alice")),
            Err(AuthError::UnknownCredential)
        );
        assert_eq!(auth.authenticate(None), Err(AuthError::MissingCredential));
    }

    #[test]
    fn token_entries_must_have_both_sides() {
        assert!(matches!(
            TokenAuthenticator::from_entries(&["nouser="]),
            Err(AuthError::InvalidEntry(_))
        ));
        assert!(TokenAuthenticator::from_entries(&["plain"]).is_err());
    }
}
