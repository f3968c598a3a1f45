//! The two independently defined schemas being stitched, with deterministic mock data.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{error::ExecutionError, registry::TypeIndex};

pub const TASK_TYPE_DEFS: &str = r#"
    type Task {
      id: ID!
      text: String
      userId: ID!
    }

    type Query {
      task(id: ID!): Task
      tasks: [Task!]!
      taskByUserId(UserId: ID!): [Task!]!
    }
"#;

pub const USER_TYPE_DEFS: &str = r#"
    interface User {
      id: ID!
      email: String!
    }

    type Editor implements User {
      id: ID!
      email: String!
      name: String!
    }

    type Admin implements User {
      id: ID!
      email: String!
      godmode: Boolean!
    }

    type Query {
      userById(id: ID!): User
      usersByIds(ids: [ID!]!): [User]!
    }
"#;

/// Extends `Task` with the cross-schema `user` relationship.
pub const LINK_TYPE_DEFS: &str = r#"
    extend type Task {
      user: User!
    }
"#;

/// Length of every list produced by the mocks, whatever was asked for.
pub const MOCK_LIST_LENGTH: usize = 2;

const MOCK_STRING: &str = "Hello World";

/// Produces the raw value of a root (`Query`) field.
///
/// Objects must carry `__typename` when the field's type is abstract.
#[async_trait]
pub trait RootResolver: Send + Sync {
    async fn resolve(&self, field: &str, args: &Map<String, Value>) -> Result<Value, ExecutionError>;
}

/// An executable schema: its type index plus the resolver of its root fields.
pub struct SubSchema {
    name: String,
    index: TypeIndex,
    root: Arc<dyn RootResolver>,
}

impl std::fmt::Debug for SubSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubSchema").field("name", &self.name).finish_non_exhaustive()
    }
}

impl SubSchema {
    pub fn new<R>(name: impl Into<String>, type_defs: &str, root: R) -> Result<Self, ExecutionError>
    where
        R: RootResolver + 'static,
    {
        Ok(Self { name: name.into(), index: TypeIndex::from_sdl(&[type_defs])?, root: Arc::new(root) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &TypeIndex {
        &self.index
    }

    #[tracing::instrument(skip(self, args), fields(schema = %self.name))]
    pub async fn resolve_root(
        &self,
        field: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, ExecutionError> {
        if self.index.root_field(field).is_none() {
            return Err(ExecutionError::UnknownField {
                type_name: super::registry::QUERY_TYPE.to_owned(),
                field: field.to_owned(),
            });
        }
        self.root.resolve(field, args).await
    }
}

pub fn task_schema() -> Result<SubSchema, ExecutionError> {
    SubSchema::new("task", TASK_TYPE_DEFS, MockTasks)
}

pub fn user_schema() -> Result<SubSchema, ExecutionError> {
    SubSchema::new("user", USER_TYPE_DEFS, MockUsers)
}

fn id_argument(args: &Map<String, Value>, name: &str) -> Result<String, ExecutionError> {
    match args.get(name) {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(ExecutionError::Validation(format!("argument \"{name}\" must be an ID"))),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MockTasks;

impl MockTasks {
    pub fn task(id: &str, user_id: &str) -> Value {
        json!({ "__typename": "Task", "id": id, "text": MOCK_STRING, "userId": user_id })
    }

    /// The user a mocked task belongs to.
    pub fn owner_of(task_id: &str) -> String {
        format!("user-{task_id}")
    }
}

#[async_trait]
impl RootResolver for MockTasks {
    async fn resolve(&self, field: &str, args: &Map<String, Value>) -> Result<Value, ExecutionError> {
        match field {
            "task" => {
                let id = id_argument(args, "id")?;
                Ok(Self::task(&id, &Self::owner_of(&id)))
            }
            "tasks" => Ok(Value::Array(
                (1..=MOCK_LIST_LENGTH)
                    .map(|i| {
                        let id = i.to_string();
                        Self::task(&id, &Self::owner_of(&id))
                    })
                    .collect(),
            )),
            "taskByUserId" => {
                let user_id = id_argument(args, "UserId")?;
                Ok(Value::Array(
                    (1..=MOCK_LIST_LENGTH).map(|i| Self::task(&i.to_string(), &user_id)).collect(),
                ))
            }
            _ => Err(ExecutionError::UnknownField {
                type_name: super::registry::QUERY_TYPE.to_owned(),
                field: field.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MockUsers;

impl MockUsers {
    /// Ids ending in an even byte are editors, the rest admins.
    pub fn user(id: &str) -> Value {
        let editor = id.bytes().last().map_or(true, |b| b % 2 == 0);
        let email = format!("{id}@example.com");
        if editor {
            json!({ "__typename": "Editor", "id": id, "email": email, "name": MOCK_STRING })
        } else {
            json!({ "__typename": "Admin", "id": id, "email": email, "godmode": true })
        }
    }
}

#[async_trait]
impl RootResolver for MockUsers {
    async fn resolve(&self, field: &str, args: &Map<String, Value>) -> Result<Value, ExecutionError> {
        match field {
            "userById" => Ok(Self::user(&id_argument(args, "id")?)),
            "usersByIds" => {
                let ids = args
                    .get("ids")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        ExecutionError::Validation("argument \"ids\" must be a list".to_owned())
                    })?
                    .iter()
                    .map(|id| id.as_str().map(str::to_owned))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        ExecutionError::Validation("argument \"ids\" must contain IDs".to_owned())
                    })?;
                // Mocked lists have a fixed length; extra entries get generated ids.
                Ok(Value::Array(
                    (0..MOCK_LIST_LENGTH)
                        .map(|i| match ids.get(i) {
                            Some(id) => Self::user(id),
                            None => Self::user(&format!("mock-user-{i}")),
                        })
                        .collect(),
                ))
            }
            _ => Err(ExecutionError::UnknownField {
                type_name: super::registry::QUERY_TYPE.to_owned(),
                field: field.to_owned(),
            }),
        }
    }
}
