//! External collaborator contracts. The engine never issues tokens, checks
//! permissions, or owns persistence — it consumes these three traits. This
//! module also ships one in-memory reference implementation of each, so the
//! service is runnable and testable standalone.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Error;

/// The opaque identity produced by an [`Authenticator`]. The engine only
/// ever holds this; it never inspects the credential that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub display_name: String,
}

/// Validates an opaque bearer credential and resolves it to a principal.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn validate(&self, credential: &str) -> Result<Principal, Error>;
}

/// Outcome of an access check, distinguishing "the document doesn't exist"
/// from "it exists but this principal may not join it" so the hub can
/// surface §7's `DocumentNotFound` and `AccessDenied` as the distinct
/// terminal errors the taxonomy calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCheck {
    Granted,
    Denied,
    NotFound,
}

/// Decides whether a principal may join a document.
#[async_trait]
pub trait AccessOracle: Send + Sync {
    async fn check_access(&self, principal: &Principal, document_id: &str) -> AccessCheck;
}

/// Initial content/version for a document, and an async sink for
/// fire-and-forget persistence. `persist` need not be transactional with
/// fan-out; the hub calls it opportunistically, not on the hot path.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn load(&self, document_id: &str) -> Result<Option<(String, u64)>, Error>;
    async fn persist(&self, document_id: &str, content: &str, version: u64) -> Result<(), Error>;
}

/// Accepts any non-empty token, deriving a principal deterministically from
/// it. Stand-in for a real verifier (e.g. JWT); rejects only the empty
/// credential.
#[derive(Debug, Default)]
pub struct StaticAuthenticator;

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn validate(&self, credential: &str) -> Result<Principal, Error> {
        if credential.is_empty() {
            return Err(Error::AuthFailure);
        }
        Ok(Principal {
            id: credential.to_string(),
            display_name: credential.to_string(),
        })
    }
}

/// Grants access unconditionally. A real deployment's oracle would consult
/// a document's collaborator list.
#[derive(Debug, Default)]
pub struct AllowAllAccessOracle;

#[async_trait]
impl AccessOracle for AllowAllAccessOracle {
    async fn check_access(&self, _principal: &Principal, _document_id: &str) -> AccessCheck {
        AccessCheck::Granted
    }
}

/// In-memory document store. Returns `None` for unseen documents so the hub
/// starts a fresh empty document at version 0; records persisted snapshots
/// without a backing store.
#[derive(Debug, Default)]
pub struct InMemoryDocumentRepository {
    documents: RwLock<HashMap<String, (String, u64)>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document, as a test fixture or a pre-warmed cache would.
    pub fn seed(&self, document_id: impl Into<String>, content: impl Into<String>, version: u64) {
        self.documents
            .write()
            .insert(document_id.into(), (content.into(), version));
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn load(&self, document_id: &str) -> Result<Option<(String, u64)>, Error> {
        Ok(self.documents.read().get(document_id).cloned())
    }

    async fn persist(&self, document_id: &str, content: &str, version: u64) -> Result<(), Error> {
        self.documents
            .write()
            .insert(document_id.to_string(), (content.to_string(), version));
        Ok(())
    }
}
