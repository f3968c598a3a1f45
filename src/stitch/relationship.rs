use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use serde_json::{Map, Value};

use super::{
    context::ExecutionContext, error::ExecutionError, executor::delegate_to_schema,
    subschema::SubSchema, types::FieldInfo,
};
use crate::{batch_function::align_results, BatchFunction};

/// Resolves a field that lives in another schema than its parent type.
#[async_trait]
pub trait RelationshipResolver: Send + Sync {
    /// Parent fields the resolver reads. The executor rejects parents that lack any of them.
    fn requires(&self) -> &[&'static str];

    /// Returns the field value already shaped by `info.selection_set`, keyed by response key.
    async fn resolve(
        &self,
        parent: &Map<String, Value>,
        ctx: &ExecutionContext,
        info: &FieldInfo,
    ) -> Result<Value, ExecutionError>;
}

/// `Task.user`, loaded from the user schema by `Task.userId`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskUser;

#[async_trait]
impl RelationshipResolver for TaskUser {
    fn requires(&self) -> &[&'static str] {
        &["userId"]
    }

    async fn resolve(
        &self,
        parent: &Map<String, Value>,
        ctx: &ExecutionContext,
        info: &FieldInfo,
    ) -> Result<Value, ExecutionError> {
        let id = parent.get("userId").and_then(Value::as_str).ok_or_else(|| {
            ExecutionError::Validation("Task.userId must be an ID".to_owned())
        })?;
        Ok(ctx.users().load(UserKey::new(id, info.clone())).await?)
    }
}

/// Key of the user loader.
///
/// Two keys are equal when they name the same user and select the same fields, so a cached value
/// always matches the selection it is served to. Hashing uses the id alone.
#[derive(Debug, Clone)]
pub struct UserKey {
    pub id: String,
    pub info: FieldInfo,
}

impl UserKey {
    pub fn new(id: impl Into<String>, info: FieldInfo) -> Self {
        Self { id: id.into(), info }
    }
}

impl PartialEq for UserKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.info.selection_set == other.info.selection_set
    }
}

impl Eq for UserKey {}

impl Hash for UserKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Fetches a batch of users with one delegated `usersByIds` call per distinct selection set.
///
/// Keys selecting the same fields share a call. Results are put back in key order.
pub struct UsersByIds;

impl UsersByIds {
    async fn fetch(schema: &SubSchema, keys: &[&UserKey]) -> Result<Vec<Value>, ExecutionError> {
        let Some(first) = keys.first() else {
            return Ok(Vec::new());
        };
        let ids = keys.iter().map(|key| Value::String(key.id.clone())).collect::<Vec<_>>();
        let mut args = Map::new();
        args.insert("ids".to_owned(), Value::Array(ids));

        match delegate_to_schema(schema, "usersByIds", &args, &first.info.plural()).await? {
            Value::Array(users) => Ok(align_results(keys.len(), users)?),
            other => Err(ExecutionError::Delegation {
                schema: schema.name().to_owned(),
                message: format!("usersByIds returned a non-list value: {other}"),
            }),
        }
    }
}

#[async_trait]
impl BatchFunction<UserKey, Value> for UsersByIds {
    type Context = Arc<SubSchema>;
    type Error = ExecutionError;

    async fn load(keys: &[UserKey], schema: &Arc<SubSchema>) -> Result<Vec<Value>, ExecutionError> {
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (position, key) in keys.iter().enumerate() {
            match groups
                .iter_mut()
                .find(|group| keys[group[0]].info.selection_set == key.info.selection_set)
            {
                Some(group) => group.push(position),
                None => groups.push(vec![position]),
            }
        }

        let fetched = future::join_all(groups.iter().map(|group| {
            let group_keys = group.iter().map(|&position| &keys[position]).collect::<Vec<_>>();
            async move { Self::fetch(schema, &group_keys).await }
        }))
        .await;

        let mut values = vec![Value::Null; keys.len()];
        for (group, users) in groups.iter().zip(fetched) {
            for (&position, user) in group.iter().zip(users?) {
                values[position] = user;
            }
        }
        Ok(values)
    }
}
