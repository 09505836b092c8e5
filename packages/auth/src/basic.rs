// ABOUTME: HTTP Basic authentication against SHA-256 password hashes
// ABOUTME: Hash comparison is constant-time

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// One configured Basic auth user. `password_hash` is the lowercase hex
/// SHA-256 of the password.
#[derive(Debug, Clone)]
pub struct BasicUser {
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct BasicAuth {
    users: HashMap<String, String>,
}

impl BasicAuth {
    pub fn new(users: Vec<BasicUser>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.username, u.password_hash))
                .collect(),
        }
    }

    /// Validates an `Authorization` header value.
    pub fn verify(&self, authorization: &str) -> bool {
        let Some(encoded) = authorization.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        let Some((username, password)) = credentials.split_once(':') else {
            return false;
        };
        let Some(stored) = self.users.get(username) else {
            return false;
        };

        let computed = hash_password(password);
        computed.as_bytes().ct_eq(stored.as_bytes()).into()
    }
}

pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> BasicAuth {
        BasicAuth::new(vec![BasicUser {
            username: "sre".into(),
            password_hash: hash_password("hunter2"),
        }])
    }

    fn header(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
    }

    #[test]
    fn valid_credentials_pass() {
        assert!(auth().verify(&header("sre", "hunter2")));
    }

    #[test]
    fn wrong_password_fails() {
        assert!(!auth().verify(&header("sre", "hunter3")));
    }

    #[test]
    fn unknown_user_fails() {
        assert!(!auth().verify(&header("ops", "hunter2")));
    }

    #[test]
    fn malformed_headers_fail() {
        let a = auth();
        assert!(!a.verify("Bearer abc"));
        assert!(!a.verify("Basic not-base64!!"));
        assert!(!a.verify(&format!("Basic {}", STANDARD.encode("no-colon"))));
    }
}
