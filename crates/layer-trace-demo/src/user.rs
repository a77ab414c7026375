//! User module: the entity, the lookup filter and the instrumented resolver

use crate::object_id::ObjectId;
use layer_trace::{trace, Class};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntity {
    /// Document id, 24 hex characters
    #[serde(rename = "_id")]
    pub id: String,
}

/// Filter for a single-user lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUserDto {
    /// Document id, 24 hex characters
    #[serde(rename = "_id")]
    pub id: String,
}

impl GetUserDto {
    /// Filter for `id`
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Reject empty or malformed ids
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.is_empty() {
            anyhow::bail!("_id should not be empty");
        }
        if !ObjectId::is_valid(&self.id) {
            anyhow::bail!("_id must be a mongodb id, got `{}`", self.id);
        }
        Ok(())
    }
}

/// Backing lookup. There is no store yet, so every lookup yields a fresh user.
fn lookup(_filter: &GetUserDto) -> Option<UserEntity> {
    Some(UserEntity {
        id: ObjectId::new().to_hex(),
    })
}

/// Resolver for user queries
#[derive(Debug, Default)]
pub struct UserResolver;

#[trace(log_input(enabled = true))]
impl UserResolver {
    /// Create the resolver
    pub fn new() -> Self {
        Self
    }

    /// Fetch one user by filter
    pub async fn get_user(&self, filter: GetUserDto) -> Option<UserEntity> {
        lookup(&filter)
    }
}

/// The resolver as a runtime member table, for configuration-driven
/// instrumentation
pub fn user_resolver_class() -> Class<UserResolver> {
    let mut class = Class::new("UserResolver").with_constructor(|_: &[Value]| Ok(UserResolver::new()));
    class
        .define_method("get_user", |_: &UserResolver, args: &[Value]| {
            let raw = args
                .first()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("get_user expects a filter"))?;
            let filter: GetUserDto = serde_json::from_value(raw)?;
            filter.validate()?;
            Ok(serde_json::to_value(lookup(&filter))?)
        })
        .define_attribute("query_name", "UserGetOneUser");
    class
}
