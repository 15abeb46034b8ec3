//! In-memory model of one annotated class, built while scanning a bindings
//! block and consumed by the code emitters.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Class {
  pub name: String,
  pub superclass: String,
  pub properties: Vec<Property>,
  pub fields: Vec<Field>,
  pub methods: Vec<Method>,
  pub static_creations: Vec<StaticCreation>,
  pub constructors: Vec<Constructor>,
  pub enums: Vec<Enum>,
  pub has_static_new: bool,
  pub uses_shared_pointer: bool,
  pub is_filter: bool,
  pub is_custom: bool,
}

/// An empty `read` means write-only, an empty `write` means read-only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Property {
  pub name: String,
  pub kind: String,
  pub read: String,
  pub write: String,
  pub is_const_overload: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Method {
  pub name: String,
  pub return_type: String,
  pub args: Vec<String>,
  /// Populated only when the arguments carry `type,name` pairs.
  pub arg_types: Vec<String>,
  pub is_const: bool,
  pub return_value_policy: String,
  pub is_overload: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticCreation {
  pub name: String,
  pub args: Vec<String>,
  pub is_overload: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constructor {
  pub args: Vec<String>,
}

/// Values are backfilled from the literal `enum class` declaration after the
/// bindings block has been parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enum {
  pub name: String,
  pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Field {
  pub cpp_name: String,
  pub py_name: String,
}
