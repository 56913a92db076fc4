use crate::auth::{encode, TokenGenerator, Validator};
use crate::config::Settings;
use crate::db::{CredentialStore, DocumentStore, TokenGrant, TokenStore};
use crate::error::{AppError, AuthError};
use std::sync::Arc;
use tracing::{debug, error, warn};

const INVALID_CREDENTIAL_FORMAT: &str = "Username or Password contains restricted characters or is too long";
const INVALID_USER_FORMAT: &str = "Username contains restricted characters or is too long";

/// Stateless coordinator for the three session flows.
pub struct SessionService {
    validator: Validator,
    credentials: CredentialStore,
    tokens: TokenStore,
}

impl SessionService {
    pub fn new(validator: Validator, credentials: CredentialStore, tokens: TokenStore) -> Self {
        Self {
            validator,
            credentials,
            tokens,
        }
    }

    pub fn from_settings(settings: &Settings, store: Arc<dyn DocumentStore>) -> Result<Self, AppError> {
        let validator = Validator::from_config(&settings.auth)?;
        let generator = TokenGenerator::from_config(&settings.auth)?;
        let credentials = CredentialStore::new(store.clone(), &settings.database.credentials_collection);
        let tokens = TokenStore::new(store, &settings.database.tokens_collection, generator);
        Ok(Self::new(validator, credentials, tokens))
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub async fn sign_up(&self, user: &str, pass: &str) -> Result<(), AppError> {
        self.check_credentials_format(user, pass)?;
        let user = encode(user);
        let pass = encode(pass);

        self.credentials.add_user(&user, &pass).await.map_err(|e| {
            debug!("Sign-up failed for {}", user);
            error!("Sign-up failed: {}", e);
            AppError::from(e)
        })
    }

    /// Returns the freshly issued token, or an empty string when the user
    /// already holds one or issuing failed.
    pub async fn authenticate(&self, user: &str, pass: &str) -> Result<String, AppError> {
        self.check_credentials_format(user, pass)?;
        let user = encode(user);
        let pass = encode(pass);

        let found = match self.credentials.find_user(&user, &pass).await {
            Ok(found) => found,
            Err(e) => {
                debug!("Credential lookup failed for {}", user);
                error!("Credential lookup failed: {}", e);
                false
            }
        };
        if !found {
            return Err(AuthError::InvalidCredentials.into());
        }

        match self.tokens.add_or_get_token(&user).await {
            Ok(TokenGrant::Issued(token)) => Ok(token),
            Ok(TokenGrant::AlreadyIssued) => {
                debug!("Authenticated {} with a token already outstanding", user);
                Ok(String::new())
            }
            Err(e) => {
                debug!("Token issue failed for {}", user);
                error!("Token issue failed: {}", e);
                Ok(String::new())
            }
        }
    }

    /// Revokes the token. Succeeds whenever the identifier is well formed.
    pub async fn sign_out(&self, user: &str, token: &str) -> Result<(), AppError> {
        if !self.validator.validate(user) {
            warn!("Rejected sign-out with malformed identifier");
            return Err(AppError::ValidationError(INVALID_USER_FORMAT.into()));
        }
        let user = encode(user);

        if let Err(e) = self.tokens.delete_token(&user, token).await {
            debug!("Token revocation failed for {}", user);
            error!("Token revocation failed: {}", e);
        }
        Ok(())
    }

    fn check_credentials_format(&self, user: &str, pass: &str) -> Result<(), AppError> {
        if self.validator.validate(user) && self.validator.validate(pass) {
            Ok(())
        } else {
            warn!("Rejected request with malformed credentials");
            Err(AppError::ValidationError(INVALID_CREDENTIAL_FORMAT.into()))
        }
    }
}
