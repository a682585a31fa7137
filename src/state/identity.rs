//! Tagged player identities. Ids coming from the game feed and ids coming from the
//! polled server listing live in disjoint namespaces and are never compared raw.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Prefix used in the canonical key of secondary-source identities.
pub const SECONDARY_PREFIX: &str = "bm_";

/// Originating data source of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Ids reported by the push-style game protocol feed.
    Primary,
    /// Ids reported by the polled public roster service.
    Secondary,
}

/// Player identity scoped to the namespace it was observed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    namespace: Namespace,
    raw_id: String,
}

/// Rejected identity keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The key (or its raw part) was empty.
    #[error("identity key must not be empty")]
    Empty,
    /// The key contained whitespace.
    #[error("identity key `{0}` contains whitespace")]
    Whitespace(String),
}

impl Identity {
    /// Identity observed by the game feed.
    pub fn primary(raw_id: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Primary,
            raw_id: raw_id.into(),
        }
    }

    /// Identity observed by the roster poll.
    pub fn secondary(raw_id: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Secondary,
            raw_id: raw_id.into(),
        }
    }

    /// Rebuild an identity from its persisted parts.
    pub fn from_parts(namespace: Namespace, raw_id: impl Into<String>) -> Self {
        Self {
            namespace,
            raw_id: raw_id.into(),
        }
    }

    /// Namespace the identity belongs to.
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Id as reported by the source, without any namespace prefix.
    pub fn raw_id(&self) -> &str {
        &self.raw_id
    }

    /// Canonical string key exposed to clients.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Namespace::Primary => f.write_str(&self.raw_id),
            Namespace::Secondary => write!(f, "{SECONDARY_PREFIX}{}", self.raw_id),
        }
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let key = key.trim();
        if key.chars().any(char::is_whitespace) {
            return Err(IdentityError::Whitespace(key.to_string()));
        }

        let identity = match key.strip_prefix(SECONDARY_PREFIX) {
            Some(raw) => Identity::secondary(raw),
            None => Identity::primary(key),
        };

        if identity.raw_id.is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(identity)
    }
}
