//! Turning user-supplied identifiers (ids, hostnames, IPs, labels) into
//! numeric object ids through an ordered chain of resolvers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;

/// Maps an identifier string to candidate ids. Resolvers may issue API calls.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Propagates any error from the lookup; an unmatched identifier is an
    /// empty list, not an error.
    async fn resolve(&self, identifier: &str) -> Result<Vec<i64>, Error>;
}

/// A [`Resolver`] backed by an async closure.
pub struct FnResolver<F> {
    name: String,
    func: F,
}

impl<F> fmt::Debug for FnResolver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResolver")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Wrap `func` as a named resolver.
pub fn resolver_fn<F, Fut>(name: impl Into<String>, func: F) -> FnResolver<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<i64>, Error>> + Send,
{
    FnResolver {
        name: name.into(),
        func,
    }
}

#[async_trait]
impl<F, Fut> Resolver for FnResolver<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<i64>, Error>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, identifier: &str) -> Result<Vec<i64>, Error> {
        (self.func)(identifier.to_owned()).await
    }
}

/// Ordered resolver chain for one object type.
///
/// A value that parses as a positive integer is returned as-is and no
/// resolver runs. Otherwise the first resolver returning a non-empty list
/// wins.
#[derive(Clone)]
pub struct IdentifierResolver {
    object_type: String,
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl fmt::Debug for IdentifierResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.resolvers.iter().map(|r| r.name()).collect();
        f.debug_struct("IdentifierResolver")
            .field("object_type", &self.object_type)
            .field("resolvers", &names)
            .finish()
    }
}

impl IdentifierResolver {
    /// `object_type` names the objects in error messages, e.g. `"virtual server"`.
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            resolvers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    #[must_use]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// # Errors
    ///
    /// Propagates the first resolver error.
    pub async fn resolve_ids(&self, identifier: &str) -> Result<Vec<i64>, Error> {
        if let Ok(id) = identifier.trim().parse::<i64>()
            && id > 0
        {
            return Ok(vec![id]);
        }

        for resolver in &self.resolvers {
            let ids = resolver.resolve(identifier).await?;
            if !ids.is_empty() {
                tracing::debug!(
                    identifier,
                    resolver = resolver.name(),
                    matches = ids.len(),
                    "identifier resolved"
                );
                return Ok(ids);
            }
        }
        Ok(Vec::new())
    }

    /// Resolve to exactly one id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolver`] when nothing or more than one object
    /// matches; the error lists the candidates.
    pub async fn resolve_id(&self, identifier: &str) -> Result<i64, Error> {
        let ids = self.resolve_ids(identifier).await?;
        match ids.as_slice() {
            [id] => Ok(*id),
            [] => Err(Error::Resolver {
                operation: "resolve_id".to_owned(),
                identifier: identifier.to_owned(),
                candidates: Vec::new(),
                message: format!("Unable to find {} '{identifier}'", self.object_type),
            }),
            _ => Err(Error::Resolver {
                operation: "resolve_id".to_owned(),
                identifier: identifier.to_owned(),
                message: format!(
                    "Multiple {} found for '{identifier}': {}",
                    self.object_type,
                    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
                ),
                candidates: ids,
            }),
        }
    }
}
