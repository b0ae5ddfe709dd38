//! Token owners ("tokenables").
//!
//! A record points at its owner by type tag + id. Instead of resolving the tag
//! to a class at runtime, each owner type the application supports registers a
//! loader under its tag in an [`OwnerRegistry`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// An entity that can own tokens.
pub trait Tokenable: Any + Send + Sync + fmt::Debug {
    /// Stable type tag stored on the record and used as the `iss` claim.
    fn owner_type(&self) -> &str;

    /// Persisted identity. `None` for an owner that has not been saved yet.
    fn owner_id(&self) -> Option<String>;

    /// Whether this owner accepts token authentication at all.
    fn supports_tokens(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any;
}

/// A bare `type + id` reference, for callers that have no richer owner model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub owner_type: String,
    pub owner_id: Option<String>,
}

impl OwnerRef {
    pub fn new(owner_type: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id: Some(owner_id.into()),
        }
    }

    pub fn unsaved(owner_type: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id: None,
        }
    }
}

impl Tokenable for OwnerRef {
    fn owner_type(&self) -> &str {
        &self.owner_type
    }

    fn owner_id(&self) -> Option<String> {
        self.owner_id.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Loads owners of one type by id.
#[async_trait]
pub trait OwnerLoader: Send + Sync {
    async fn load(&self, owner_id: &str) -> anyhow::Result<Option<Arc<dyn Tokenable>>>;
}

/// Type tag → loader map. Built once at bootstrap, read-only afterwards.
#[derive(Default, Clone)]
pub struct OwnerRegistry {
    loaders: HashMap<String, Arc<dyn OwnerLoader>>,
}

impl fmt::Debug for OwnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerRegistry")
            .field("types", &self.loaders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, owner_type: impl Into<String>, loader: impl OwnerLoader + 'static) -> Self {
        self.loaders.insert(owner_type.into(), Arc::new(loader));
        self
    }

    pub fn is_registered(&self, owner_type: &str) -> bool {
        self.loaders.contains_key(owner_type)
    }

    /// Resolve an owner. Unknown type tags resolve to `None`.
    pub async fn resolve(
        &self,
        owner_type: &str,
        owner_id: &str,
    ) -> anyhow::Result<Option<Arc<dyn Tokenable>>> {
        match self.loaders.get(owner_type) {
            Some(loader) => loader.load(owner_id).await,
            None => {
                tracing::debug!(owner_type, "no loader registered for owner type");
                Ok(None)
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
