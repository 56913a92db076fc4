use serde::{Deserialize, Serialize};

/// Stored credential pair. Both fields hold encoded values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub user: String,
    #[serde(rename = "pass")]
    pub secret: String,
}

impl CredentialRecord {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user: String,
    pub token: String,
}

impl TokenRecord {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }
}

/// Lookup filter for the token collection; an absent token matches any.
#[derive(Debug, Clone, Serialize)]
pub struct TokenFilter<'a> {
    pub user: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<&'a str>,
}
