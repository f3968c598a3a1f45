use std::collections::{HashMap, HashSet};

use graphql_parser::schema::{Definition, Field, TypeDefinition, TypeExtension};

use super::{error::ExecutionError, types::TypeRef};

pub const QUERY_TYPE: &str = "Query";

/// Field and interface lookup tables built from SDL.
#[derive(Debug, Clone, Default)]
pub struct TypeIndex {
    fields: HashMap<String, HashMap<String, TypeRef>>,
    implementers: HashMap<String, HashSet<String>>,
}

impl TypeIndex {
    pub fn from_sdl<S: AsRef<str>>(sources: &[S]) -> Result<Self, ExecutionError> {
        let mut index = Self::default();
        for source in sources {
            index.extend_sdl(source.as_ref())?;
        }
        Ok(index)
    }

    /// Adds the types of `sdl`. `extend type` definitions must target a type that is already
    /// known.
    pub fn extend_sdl(&mut self, sdl: &str) -> Result<(), ExecutionError> {
        let document = graphql_parser::parse_schema::<String>(sdl)
            .map_err(|e| ExecutionError::Schema(e.to_string()))?;

        for definition in &document.definitions {
            match definition {
                Definition::TypeDefinition(TypeDefinition::Object(object)) => {
                    self.add_fields(&object.name, &object.fields);
                    self.add_implementer(&object.name, &object.implements_interfaces);
                }
                Definition::TypeDefinition(TypeDefinition::Interface(interface)) => {
                    self.add_fields(&interface.name, &interface.fields);
                }
                Definition::TypeExtension(TypeExtension::Object(extension)) => {
                    self.require_type(&extension.name)?;
                    self.add_fields(&extension.name, &extension.fields);
                    self.add_implementer(&extension.name, &extension.implements_interfaces);
                }
                Definition::TypeExtension(TypeExtension::Interface(extension)) => {
                    self.require_type(&extension.name)?;
                    self.add_fields(&extension.name, &extension.fields);
                }
                // Scalars, enums, unions and inputs carry no fields the executor needs.
                _ => {}
            }
        }
        Ok(())
    }

    /// Merges `other` into this index. Fields of the same type are unioned.
    pub fn merge(&mut self, other: &TypeIndex) {
        for (type_name, fields) in &other.fields {
            self.fields
                .entry(type_name.clone())
                .or_default()
                .extend(fields.iter().map(|(name, ty)| (name.clone(), ty.clone())));
        }
        for (interface, objects) in &other.implementers {
            self.implementers.entry(interface.clone()).or_default().extend(objects.iter().cloned());
        }
    }

    pub(crate) fn has_type(&self, type_name: &str) -> bool {
        self.fields.contains_key(type_name)
    }

    pub fn field_type(&self, type_name: &str, field: &str) -> Option<&TypeRef> {
        self.fields.get(type_name)?.get(field)
    }

    pub fn root_field(&self, field: &str) -> Option<&TypeRef> {
        self.field_type(QUERY_TYPE, field)
    }

    pub fn root_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.get(QUERY_TYPE).into_iter().flat_map(|fields| fields.keys().map(String::as_str))
    }

    /// Whether an object of type `concrete` satisfies a fragment on `condition`.
    pub fn type_matches(&self, concrete: &str, condition: &str) -> bool {
        concrete == condition
            || self.implementers.get(condition).map_or(false, |objects| objects.contains(concrete))
    }

    fn add_fields(&mut self, type_name: &str, fields: &[Field<'_, String>]) {
        let entry = self.fields.entry(type_name.to_owned()).or_default();
        for field in fields {
            entry.insert(field.name.clone(), TypeRef::from(&field.field_type));
        }
    }

    fn add_implementer(&mut self, object: &str, interfaces: &[String]) {
        for interface in interfaces {
            self.implementers.entry(interface.clone()).or_default().insert(object.to_owned());
        }
    }

    fn require_type(&self, type_name: &str) -> Result<(), ExecutionError> {
        if self.has_type(type_name) {
            Ok(())
        } else {
            Err(ExecutionError::Schema(format!("cannot extend unknown type \"{type_name}\"")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_interfaces_and_extensions() {
        let mut index = TypeIndex::from_sdl(&[
            "interface User { id: ID! } type Admin implements User { id: ID! godmode: Boolean! }",
            "type Task { id: ID! } type Query { task(id: ID!): Task }",
        ])
        .unwrap();
        index.extend_sdl("extend type Task { user: User! }").unwrap();

        assert_eq!(index.field_type("Task", "user").unwrap().to_string(), "User!");
        assert_eq!(index.root_field("task").unwrap().to_string(), "Task");
        assert!(index.type_matches("Admin", "User"));
        assert!(!index.type_matches("Task", "User"));
        assert!(index.extend_sdl("extend type Missing { x: Int }").is_err());
    }
}
