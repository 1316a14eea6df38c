// Credential resolution — maps file ids to access tokens via a literal token
// or a caller-supplied resolver.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::PreviewError;

/// What a resolver may hand back: one token covering every requested id, or a
/// per-id map.
#[derive(Debug, Clone)]
pub enum TokenResponse {
    Single(String),
    Map(HashMap<String, String>),
}

/// Caller-supplied credential generator. Invoked with the full batch of ids
/// so one round trip can cover a whole prefetch window.
#[async_trait]
pub trait TokenResolverFn: Send + Sync {
    async fn resolve(&self, file_ids: &[String]) -> Result<TokenResponse>;
}

/// Source of access credentials for a session: either a literal token that
/// applies to every file, or a resolver function.
#[derive(Clone)]
pub enum CredentialSource {
    Token(String),
    Resolver(Arc<dyn TokenResolverFn>),
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::Token(_) => f.write_str("CredentialSource::Token(..)"),
            CredentialSource::Resolver(_) => f.write_str("CredentialSource::Resolver(..)"),
        }
    }
}

/// Resolve a token for every requested id.
///
/// Fails if no ids were requested, if the resolver itself fails, or if the
/// resolver's map is missing any requested id.
pub async fn resolve_tokens(
    file_ids: &[String],
    source: &CredentialSource,
) -> Result<HashMap<String, String>, PreviewError> {
    if file_ids.is_empty() {
        return Err(PreviewError::BadCredential("no file ids requested"));
    }

    let response = match source {
        CredentialSource::Token(token) => TokenResponse::Single(token.clone()),
        CredentialSource::Resolver(resolver) => {
            resolver.resolve(file_ids).await.map_err(PreviewError::Fetch)?
        }
    };

    let mut tokens = HashMap::with_capacity(file_ids.len());
    match response {
        TokenResponse::Single(token) => {
            for id in file_ids {
                tokens.insert(id.clone(), token.clone());
            }
        }
        TokenResponse::Map(map) => {
            for id in file_ids {
                let token = map
                    .get(id)
                    .ok_or_else(|| PreviewError::MissingToken(id.clone()))?;
                tokens.insert(id.clone(), token.clone());
            }
        }
    }

    Ok(tokens)
}
