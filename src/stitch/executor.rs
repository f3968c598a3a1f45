use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::{json, Map, Value};

use super::{
    context::ExecutionContext,
    error::ExecutionError,
    registry::{TypeIndex, QUERY_TYPE},
    relationship::RelationshipResolver,
    subschema::SubSchema,
    types::{
        child_path, display_path, lower_operation, FieldInfo, FieldSelection, PathSegment,
        Selection, TypeRef, TYPENAME_FIELD,
    },
};

type Relationships = HashMap<String, Arc<dyn RelationshipResolver>>;

fn relationship_key(type_name: &str, field: &str) -> String {
    format!("{type_name}.{field}")
}

/// Error attached to the response for one failed field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub message: String,
    pub path: Vec<PathSegment>,
}

/// Result of executing a query: partial data plus one error per failed field.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub data: Value,
    pub errors: Vec<FieldError>,
}

impl Response {
    fn from_error(error: ExecutionError) -> Self {
        Self { data: Value::Null, errors: vec![FieldError { message: error.to_string(), path: Vec::new() }] }
    }

    pub fn to_json(&self) -> Value {
        let mut response = json!({ "data": self.data });
        if !self.errors.is_empty() {
            response["errors"] = self
                .errors
                .iter()
                .map(|error| {
                    let mut entry = json!({ "message": error.message });
                    if !error.path.is_empty() {
                        entry["path"] = error.path.iter().map(Value::from).collect();
                    }
                    entry
                })
                .collect();
        }
        response
    }
}

/// Output of a field resolver.
enum Resolved {
    /// Source data still to be completed against the field's selection set.
    Raw(Value),
    /// Already shaped by the field's selection set, keyed by response key.
    Completed(Value),
}

/// A null reached a non-null position. The cause is already recorded; the nearest nullable
/// ancestor becomes null.
#[derive(Debug)]
struct NullBubble;

/// Completes raw resolver output against a selection set, recording field errors as it goes.
struct Completer<'a> {
    index: &'a TypeIndex,
    relationships: &'a Relationships,
    router: Option<&'a ComposedSchema>,
    ctx: Option<&'a ExecutionContext>,
    errors: Mutex<Vec<FieldError>>,
}

impl<'a> Completer<'a> {
    fn record(&self, error: ExecutionError, path: &[PathSegment]) {
        tracing::debug!(%error, path = %display_path(path), "field error");
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FieldError { message: error.to_string(), path: path.to_vec() });
    }

    fn into_errors(self) -> Vec<FieldError> {
        self.errors.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete_value(
        &'a self,
        ty: &'a TypeRef,
        selection_set: &'a [Selection],
        value: Value,
        path: Vec<PathSegment>,
    ) -> BoxFuture<'a, Result<Value, NullBubble>> {
        async move {
            match ty {
                TypeRef::NonNull(inner) => {
                    let value = self.complete_value(inner, selection_set, value, path.clone()).await?;
                    if value.is_null() {
                        self.record(ExecutionError::NullViolation(display_path(&path)), &path);
                        return Err(NullBubble);
                    }
                    Ok(value)
                }
                _ if value.is_null() => Ok(Value::Null),
                TypeRef::List(inner) => {
                    let Value::Array(items) = value else {
                        self.record(
                            ExecutionError::Validation(format!("expected a list of {inner}")),
                            &path,
                        );
                        return Err(NullBubble);
                    };
                    let items = future::join_all(items.into_iter().enumerate().map(|(i, item)| {
                        self.complete_value(
                            inner,
                            selection_set,
                            item,
                            child_path(&path, PathSegment::Index(i)),
                        )
                    }))
                    .await;
                    Ok(Value::Array(items.into_iter().collect::<Result<_, _>>()?))
                }
                TypeRef::Named(_) if selection_set.is_empty() => Ok(value),
                TypeRef::Named(name) => self.complete_object(name, selection_set, value, path).await,
            }
        }
        .boxed()
    }

    fn complete_object(
        &'a self,
        type_name: &'a str,
        selection_set: &'a [Selection],
        value: Value,
        path: Vec<PathSegment>,
    ) -> BoxFuture<'a, Result<Value, NullBubble>> {
        async move {
            let Value::Object(object) = value else {
                self.record(
                    ExecutionError::Validation(format!("expected an object of type {type_name}")),
                    &path,
                );
                return Err(NullBubble);
            };
            let concrete =
                object.get(TYPENAME_FIELD).and_then(Value::as_str).unwrap_or(type_name).to_owned();

            let mut fields = Vec::new();
            self.collect_fields(&concrete, selection_set, &mut fields);

            let object = &object;
            let concrete = concrete.as_str();
            let results = future::join_all(fields.into_iter().map(|field| {
                let field_path =
                    child_path(&path, PathSegment::Field(field.response_key().to_owned()));
                async move {
                    (field.response_key(), self.execute_field(concrete, object, field, field_path).await)
                }
            }))
            .await;

            let mut output = Map::new();
            for (key, result) in results {
                output.insert(key.to_owned(), result?);
            }
            Ok(Value::Object(output))
        }
        .boxed()
    }

    /// Flattens fragments that apply to `concrete`, keeping the first field per response key.
    fn collect_fields(
        &self,
        concrete: &str,
        selection_set: &'a [Selection],
        fields: &mut Vec<&'a FieldSelection>,
    ) {
        for selection in selection_set {
            match selection {
                Selection::Field(field) => {
                    if !fields.iter().any(|seen| seen.response_key() == field.response_key()) {
                        fields.push(field);
                    }
                }
                Selection::InlineFragment { type_condition, selection_set } => {
                    let applies = type_condition
                        .as_deref()
                        .map_or(true, |condition| self.index.type_matches(concrete, condition));
                    if applies {
                        self.collect_fields(concrete, selection_set, fields);
                    }
                }
            }
        }
    }

    async fn execute_field(
        &'a self,
        type_name: &str,
        object: &Map<String, Value>,
        field: &'a FieldSelection,
        path: Vec<PathSegment>,
    ) -> Result<Value, NullBubble> {
        if field.name == TYPENAME_FIELD {
            return Ok(Value::String(type_name.to_owned()));
        }
        let Some(field_type) = self.index.field_type(type_name, &field.name) else {
            self.record(
                ExecutionError::UnknownField {
                    type_name: type_name.to_owned(),
                    field: field.name.clone(),
                },
                &path,
            );
            return Ok(Value::Null);
        };

        let completed = match self.resolve_field(type_name, object, field, field_type, &path).await {
            Ok(Resolved::Raw(raw)) => {
                self.complete_value(field_type, &field.selection_set, raw, path).await
            }
            Ok(Resolved::Completed(value)) if value.is_null() && field_type.is_non_null() => {
                self.record(ExecutionError::NullViolation(display_path(&path)), &path);
                Err(NullBubble)
            }
            Ok(Resolved::Completed(value)) => Ok(value),
            Err(error) => {
                self.record(error, &path);
                Err(NullBubble)
            }
        };
        match completed {
            Err(NullBubble) if !field_type.is_non_null() => Ok(Value::Null),
            completed => completed,
        }
    }

    async fn resolve_field(
        &self,
        type_name: &str,
        object: &Map<String, Value>,
        field: &FieldSelection,
        field_type: &TypeRef,
        path: &[PathSegment],
    ) -> Result<Resolved, ExecutionError> {
        if type_name == QUERY_TYPE {
            if let Some(router) = self.router {
                return router.resolve_root(&field.name, &field.arguments).await.map(Resolved::Raw);
            }
        }

        if let Some(resolver) = self.relationships.get(&relationship_key(type_name, &field.name)) {
            let ctx = self.ctx.ok_or_else(|| {
                ExecutionError::Validation(format!(
                    "{type_name}.{} needs an execution context",
                    field.name
                ))
            })?;
            if let Some(missing) = resolver.requires().iter().find(|name| !object.contains_key(**name))
            {
                return Err(ExecutionError::MissingDependency {
                    type_name: type_name.to_owned(),
                    field: field.name.clone(),
                    required: (*missing).to_owned(),
                });
            }
            let info = FieldInfo {
                parent_type: type_name.to_owned(),
                field_name: field.name.clone(),
                return_type: field_type.clone(),
                selection_set: field.selection_set.clone(),
                path: path.to_vec(),
            };
            return resolver.resolve(object, ctx, &info).await.map(Resolved::Completed);
        }

        Ok(Resolved::Raw(object.get(&field.name).cloned().unwrap_or(Value::Null)))
    }
}

/// Runs `field` on `schema` and shapes the result by `info`'s return type and selection set.
///
/// The caller decides the return type: a plural field must be delegated with a list type, so
/// loaders turn their singular field info into its plural form first.
#[tracing::instrument(skip(schema, args, info), fields(schema = schema.name(), return_type = %info.return_type))]
pub async fn delegate_to_schema(
    schema: &SubSchema,
    field: &str,
    args: &Map<String, Value>,
    info: &FieldInfo,
) -> Result<Value, ExecutionError> {
    let declared = schema.index().root_field(field).ok_or_else(|| ExecutionError::UnknownField {
        type_name: QUERY_TYPE.to_owned(),
        field: field.to_owned(),
    })?;
    if declared.is_list() != info.return_type.is_list() {
        return Err(ExecutionError::Delegation {
            schema: schema.name().to_owned(),
            message: format!(
                "{field} returns {declared} but the delegated call expects {}",
                info.return_type
            ),
        });
    }

    let raw = schema.resolve_root(field, args).await?;
    let relationships = Relationships::new();
    let completer = Completer {
        index: schema.index(),
        relationships: &relationships,
        router: None,
        ctx: None,
        errors: Mutex::new(Vec::new()),
    };
    let completed = completer
        .complete_value(
            &info.return_type,
            &info.selection_set,
            raw,
            vec![PathSegment::Field(field.to_owned())],
        )
        .await;
    let errors = completer.into_errors();

    match (completed, errors.into_iter().next()) {
        (Ok(value), None) => Ok(value),
        (_, Some(error)) => Err(ExecutionError::Delegation {
            schema: schema.name().to_owned(),
            message: format!("{} at {}", error.message, display_path(&error.path)),
        }),
        (Err(NullBubble), None) => Err(ExecutionError::Delegation {
            schema: schema.name().to_owned(),
            message: format!("{field} returned null"),
        }),
    }
}

/// Several sub-schemas merged into one, with relationship fields linking their types.
pub struct ComposedSchema {
    index: TypeIndex,
    subschemas: Vec<Arc<SubSchema>>,
    root_owners: HashMap<String, usize>,
    relationships: Relationships,
}

impl ComposedSchema {
    /// Merges `subschemas` and applies `link_type_defs` (usually `extend type` definitions).
    ///
    /// Each root field must be defined by exactly one sub-schema.
    pub fn new(
        subschemas: Vec<Arc<SubSchema>>,
        link_type_defs: &str,
    ) -> Result<Self, ExecutionError> {
        let mut index = TypeIndex::default();
        let mut root_owners = HashMap::new();
        for (position, schema) in subschemas.iter().enumerate() {
            for root in schema.index().root_fields() {
                if root_owners.insert(root.to_owned(), position).is_some() {
                    return Err(ExecutionError::Schema(format!(
                        "root field \"{root}\" is defined by more than one schema"
                    )));
                }
            }
            index.merge(schema.index());
        }
        index.extend_sdl(link_type_defs)?;
        Ok(Self { index, subschemas, root_owners, relationships: Relationships::new() })
    }

    /// Attaches `resolver` to `type_name.field`, which must exist in the composed schema.
    pub fn with_relationship<R>(
        mut self,
        type_name: &str,
        field: &str,
        resolver: R,
    ) -> Result<Self, ExecutionError>
    where
        R: RelationshipResolver + 'static,
    {
        if self.index.field_type(type_name, field).is_none() {
            return Err(ExecutionError::UnknownField {
                type_name: type_name.to_owned(),
                field: field.to_owned(),
            });
        }
        self.relationships.insert(relationship_key(type_name, field), Arc::new(resolver));
        Ok(self)
    }

    async fn resolve_root(
        &self,
        field: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, ExecutionError> {
        let owner = self.root_owners.get(field).ok_or_else(|| ExecutionError::UnknownField {
            type_name: QUERY_TYPE.to_owned(),
            field: field.to_owned(),
        })?;
        self.subschemas[*owner].resolve_root(field, args).await
    }

    /// Executes `query`. `ctx` lives exactly as long as this execution.
    #[tracing::instrument(skip_all)]
    pub async fn execute(
        &self,
        query: &str,
        variables: &Map<String, Value>,
        ctx: ExecutionContext,
    ) -> Response {
        let document = match graphql_parser::parse_query::<String>(query) {
            Ok(document) => document,
            Err(e) => return Response::from_error(ExecutionError::Syntax(e.to_string())),
        };
        let selection_set = match lower_operation(&document, variables) {
            Ok(selection_set) => selection_set,
            Err(error) => return Response::from_error(error),
        };

        let completer = Completer {
            index: &self.index,
            relationships: &self.relationships,
            router: Some(self),
            ctx: Some(&ctx),
            errors: Mutex::new(Vec::new()),
        };
        let data = completer
            .complete_object(QUERY_TYPE, &selection_set, Value::Object(Map::new()), Vec::new())
            .await
            .unwrap_or(Value::Null);
        let errors = completer.into_errors();
        tracing::debug!(errors = errors.len(), "execution finished");
        Response { data, errors }
    }
}
