//! Owned, lifetime-free views of the parts of a GraphQL document the executor works with.

use std::collections::HashMap;
use std::fmt;

use graphql_parser::query::{
    Definition, Document, FragmentDefinition, OperationDefinition, Selection as AstSelection,
    SelectionSet, Type, TypeCondition, Value as AstValue,
};
use serde_json::{Map, Number, Value};

use super::error::ExecutionError;

pub const TYPENAME_FIELD: &str = "__typename";

/// Return-type descriptor of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.named(),
        }
    }

    /// Wraps this type in a list, leaving `self` untouched.
    pub fn list_of(&self) -> TypeRef {
        TypeRef::List(Box::new(self.clone()))
    }

    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::List(_) => true,
            TypeRef::NonNull(inner) => inner.is_list(),
            TypeRef::Named(_) => false,
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::List(inner) => write!(f, "[{inner}]"),
            TypeRef::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

impl<'a> From<&Type<'a, String>> for TypeRef {
    fn from(ty: &Type<'a, String>) -> Self {
        match ty {
            Type::NamedType(name) => TypeRef::Named(name.clone()),
            Type::ListType(inner) => TypeRef::List(Box::new(inner.as_ref().into())),
            Type::NonNullType(inner) => TypeRef::NonNull(Box::new(inner.as_ref().into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Map<String, Value>,
    pub selection_set: Vec<Selection>,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self { alias: None, name: name.into(), arguments: Map::new(), selection_set: Vec::new() }
    }

    /// Key under which this field appears in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A selection with variables substituted and named fragments inlined.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(FieldSelection),
    InlineFragment { type_condition: Option<String>, selection_set: Vec<Selection> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&PathSegment> for Value {
    fn from(segment: &PathSegment) -> Self {
        match segment {
            PathSegment::Field(name) => Value::String(name.clone()),
            PathSegment::Index(index) => Value::from(*index),
        }
    }
}

pub(crate) fn child_path(path: &[PathSegment], segment: PathSegment) -> Vec<PathSegment> {
    let mut child = path.to_vec();
    child.push(segment);
    child
}

pub(crate) fn display_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(|segment| match segment {
            PathSegment::Field(name) => name.clone(),
            PathSegment::Index(index) => index.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Everything a field resolver knows about the field it is resolving.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub parent_type: String,
    pub field_name: String,
    pub return_type: TypeRef,
    pub selection_set: Vec<Selection>,
    pub path: Vec<PathSegment>,
}

impl FieldInfo {
    /// The same field, returning a list of what it used to return.
    pub fn plural(&self) -> FieldInfo {
        FieldInfo { return_type: self.return_type.list_of(), ..self.clone() }
    }
}

/// Lowers the (only) query operation of `document` into owned selections.
pub fn lower_operation(
    document: &Document<'_, String>,
    variables: &Map<String, Value>,
) -> Result<Vec<Selection>, ExecutionError> {
    let fragments = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
            Definition::Operation(_) => None,
        })
        .collect::<HashMap<_, _>>();

    let mut operations = document.definitions.iter().filter_map(|definition| match definition {
        Definition::Operation(operation) => Some(operation),
        Definition::Fragment(_) => None,
    });
    let operation = operations
        .next()
        .ok_or_else(|| ExecutionError::Validation("document contains no operation".to_owned()))?;
    if operations.next().is_some() {
        return Err(ExecutionError::Validation(
            "documents with several operations are not supported".to_owned(),
        ));
    }

    let (selection_set, variables) = match operation {
        OperationDefinition::SelectionSet(selection_set) => (selection_set, variables.clone()),
        OperationDefinition::Query(query) => {
            let mut resolved = variables.clone();
            for definition in &query.variable_definitions {
                if let (false, Some(default)) =
                    (resolved.contains_key(&definition.name), &definition.default_value)
                {
                    let default = lower_value(default, variables)?;
                    resolved.insert(definition.name.clone(), default);
                }
            }
            (&query.selection_set, resolved)
        }
        OperationDefinition::Mutation(_) | OperationDefinition::Subscription(_) => {
            return Err(ExecutionError::Validation("only query operations are supported".to_owned()))
        }
    };

    Lowering { fragments, variables, visiting: Vec::new() }.selection_set(selection_set)
}

struct Lowering<'d, 'a> {
    fragments: HashMap<&'d str, &'d FragmentDefinition<'a, String>>,
    variables: Map<String, Value>,
    visiting: Vec<&'d str>,
}

impl<'d, 'a> Lowering<'d, 'a> {
    fn selection_set(
        &mut self,
        selection_set: &'d SelectionSet<'a, String>,
    ) -> Result<Vec<Selection>, ExecutionError> {
        let mut lowered = Vec::with_capacity(selection_set.items.len());
        for item in &selection_set.items {
            lowered.push(match item {
                AstSelection::Field(field) => Selection::Field(FieldSelection {
                    alias: field.alias.clone(),
                    name: field.name.clone(),
                    arguments: field
                        .arguments
                        .iter()
                        .map(|(name, value)| Ok((name.clone(), lower_value(value, &self.variables)?)))
                        .collect::<Result<_, ExecutionError>>()?,
                    selection_set: self.selection_set(&field.selection_set)?,
                }),
                AstSelection::InlineFragment(fragment) => Selection::InlineFragment {
                    type_condition: fragment
                        .type_condition
                        .as_ref()
                        .map(|TypeCondition::On(name)| name.clone()),
                    selection_set: self.selection_set(&fragment.selection_set)?,
                },
                AstSelection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    let fragment = *self.fragments.get(name).ok_or_else(|| {
                        ExecutionError::Validation(format!("unknown fragment \"{name}\""))
                    })?;
                    if self.visiting.contains(&name) {
                        return Err(ExecutionError::Validation(format!(
                            "fragment \"{name}\" spreads itself"
                        )));
                    }
                    self.visiting.push(name);
                    let selection_set = self.selection_set(&fragment.selection_set)?;
                    self.visiting.pop();
                    let TypeCondition::On(type_condition) = &fragment.type_condition;
                    Selection::InlineFragment {
                        type_condition: Some(type_condition.clone()),
                        selection_set,
                    }
                }
            });
        }
        Ok(lowered)
    }
}

fn lower_value(
    value: &AstValue<'_, String>,
    variables: &Map<String, Value>,
) -> Result<Value, ExecutionError> {
    Ok(match value {
        AstValue::Variable(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        AstValue::Int(number) => number
            .as_i64()
            .map(Value::from)
            .ok_or_else(|| ExecutionError::Validation("integer out of range".to_owned()))?,
        AstValue::Float(float) => Number::from_f64(*float).map(Value::Number).unwrap_or(Value::Null),
        AstValue::String(string) => Value::String(string.clone()),
        AstValue::Boolean(boolean) => Value::Bool(*boolean),
        AstValue::Null => Value::Null,
        AstValue::Enum(name) => Value::String(name.clone()),
        AstValue::List(items) => Value::Array(
            items.iter().map(|item| lower_value(item, variables)).collect::<Result<_, _>>()?,
        ),
        AstValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| Ok((name.clone(), lower_value(value, variables)?)))
                .collect::<Result<_, ExecutionError>>()?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plural_wraps_without_mutating() {
        let info = FieldInfo {
            parent_type: "Task".to_owned(),
            field_name: "user".to_owned(),
            return_type: TypeRef::NonNull(Box::new(TypeRef::Named("User".to_owned()))),
            selection_set: Vec::new(),
            path: Vec::new(),
        };
        let plural = info.plural();
        assert_eq!(plural.return_type.to_string(), "[User!]");
        assert_eq!(info.return_type.to_string(), "User!");
        assert!(plural.return_type.is_list());
        assert_eq!(plural.return_type.named(), "User");
    }

    #[test]
    fn lowers_variables_and_fragments() {
        let document = graphql_parser::parse_query::<String>(
            r#"query Q($id: ID = "7") { task(id: $id) { ...parts } }
               fragment parts on Task { id owner: userId }"#,
        )
        .unwrap();
        let selections = lower_operation(&document, &Map::new()).unwrap();
        let Selection::Field(task) = &selections[0] else { panic!("expected a field") };
        assert_eq!(task.arguments.get("id"), Some(&Value::String("7".to_owned())));
        let Selection::InlineFragment { type_condition, selection_set } = &task.selection_set[0]
        else {
            panic!("expected an inline fragment")
        };
        assert_eq!(type_condition.as_deref(), Some("Task"));
        let Selection::Field(owner) = &selection_set[1] else { panic!("expected a field") };
        assert_eq!(owner.response_key(), "owner");
    }
}
