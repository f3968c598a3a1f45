//! A minimal stitching layer: two mocked schemas, merged, with `Task.user` resolved by batching
//! delegated `usersByIds` calls through a per-execution [`Loader`](crate::Loader).
//!
//! ```no_run
//! # async fn run() -> Result<(), stitchload::stitch::ExecutionError> {
//! use std::sync::Arc;
//! use stitchload::stitch::*;
//!
//! let users = Arc::new(user_schema()?);
//! let schema = ComposedSchema::new(vec![Arc::new(task_schema()?), Arc::clone(&users)], LINK_TYPE_DEFS)?
//!     .with_relationship("Task", "user", TaskUser)?;
//! let response = schema
//!     .execute(r#"{ task(id: "1") { id user { id email } } }"#, &Default::default(), ExecutionContext::new(users))
//!     .await;
//! println!("{}", response.to_json());
//! # Ok(())
//! # }
//! ```

mod context;
mod error;
mod executor;
mod registry;
mod relationship;
mod subschema;
mod types;

pub use context::ExecutionContext;
pub use error::ExecutionError;
pub use executor::{delegate_to_schema, ComposedSchema, FieldError, Response};
pub use registry::{TypeIndex, QUERY_TYPE};
pub use relationship::{RelationshipResolver, TaskUser, UserKey, UsersByIds};
pub use subschema::{
    task_schema, user_schema, MockTasks, MockUsers, RootResolver, SubSchema, LINK_TYPE_DEFS,
    MOCK_LIST_LENGTH, TASK_TYPE_DEFS, USER_TYPE_DEFS,
};
pub use types::{FieldInfo, FieldSelection, PathSegment, Selection, TypeRef};
