pub mod hl;
pub mod sort;

use std::fmt;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

pub const PYB11_BEGIN_BINDINGS: &str = "PYB11_BEGIN_BINDINGS";
pub const PYB11_END_BINDINGS: &str = "PYB11_END_BINDINGS";
pub const PYB11_PROPERTY: &str = "PYB11_PROPERTY";
pub const PYB11_METHOD: &str = "PYB11_METHOD";
pub const PYB11_STATIC_CREATION: &str = "PYB11_STATIC_CREATION";
pub const PYB11_CREATION: &str = "PYB11_CREATION";
pub const PYB11_ENUMERATION: &str = "PYB11_ENUMERATION";
pub const PYB11_STATIC_NEW_MACRO: &str = "PYB11_STATIC_NEW_MACRO";
pub const PYB11_FILTER_NEW_MACRO: &str = "PYB11_FILTER_NEW_MACRO";
pub const PYB11_SHARED_POINTERS: &str = "PYB11_SHARED_POINTERS";
pub const PYB11_FILTER: &str = "PYB11_FILTER";
pub const PYB11_CUSTOM: &str = "PYB11_CUSTOM";
pub const PYB11_FIELD: &str = "PYB11_FIELD";

pub const PYB11_SUPERCLASS: &str = "SUPERCLASS";
pub const PYB11_READ: &str = "READ";
pub const PYB11_WRITE: &str = "WRITE";
pub const PYB11_CONST_GET_OVERLOAD: &str = "CONST_GET_OVERLOAD";
pub const PYB11_CONST_METHOD: &str = "CONST_METHOD";
pub const PYB11_RETURN_VALUE_POLICY: &str = "RETURN_VALUE_POLICY";
pub const PYB11_ARGS: &str = "ARGS";
pub const PYB11_OVERLOAD: &str = "OVERLOAD";

#[derive(Debug)]
pub struct ParseError {
  message: String,
}

impl ParseError {
  pub fn new(message: impl Into<String>) -> Self {
    ParseError {
      message: message.into(),
    }
  }

  /// Annotates the error with the source file and 1-based line it came from.
  pub fn at(self, origin: &str, line: usize) -> Self {
    ParseError::new(format!("{}:{}: {}", origin, line, self.message))
  }
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.message)
  }
}

impl std::error::Error for ParseError {}

static MACRO_ARGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((.*?)\)").unwrap());

/// Returns the whitespace-split, non-empty tokens inside the first
/// parenthesis pair of a macro invocation line.
pub fn extract_macro_args(line: &str) -> Result<Vec<String>, ParseError> {
  let captures = MACRO_ARGS
    .captures(line)
    .ok_or_else(|| ParseError::new(format!("no macro argument list in '{}'", line)))?;
  Ok(
    captures[1]
      .split(' ')
      .filter(|it| !it.is_empty())
      .map(ToOwned::to_owned)
      .collect(),
  )
}

/// The closed set of line shapes recognized inside a bindings block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
  Property,
  Method,
  StaticCreation,
  Creation,
  Enumeration,
  StaticNewMarker,
  FilterNewMarker,
  SharedPointersMarker,
  FilterMarker,
  CustomMarker,
  Field,
  EndMarker,
  Unrecognized,
}

pub fn classify_line(line: &str) -> LineKind {
  // FILTER_NEW_MACRO shares the FILTER prefix and must be tested first.
  if line.starts_with(PYB11_END_BINDINGS) {
    LineKind::EndMarker
  } else if line.starts_with(PYB11_PROPERTY) {
    LineKind::Property
  } else if line.starts_with(PYB11_METHOD) {
    LineKind::Method
  } else if line.starts_with(PYB11_STATIC_CREATION) {
    LineKind::StaticCreation
  } else if line.starts_with(PYB11_CREATION) {
    LineKind::Creation
  } else if line.starts_with(PYB11_ENUMERATION) {
    LineKind::Enumeration
  } else if line.starts_with(PYB11_STATIC_NEW_MACRO) {
    LineKind::StaticNewMarker
  } else if line.starts_with(PYB11_FILTER_NEW_MACRO) {
    LineKind::FilterNewMarker
  } else if line.starts_with(PYB11_SHARED_POINTERS) {
    LineKind::SharedPointersMarker
  } else if line.starts_with(PYB11_FILTER) {
    LineKind::FilterMarker
  } else if line.starts_with(PYB11_CUSTOM) {
    LineKind::CustomMarker
  } else if line.starts_with(PYB11_FIELD) {
    LineKind::Field
  } else {
    LineKind::Unrecognized
  }
}

pub fn parse_class(line: &str) -> Result<hl::Class, ParseError> {
  let mut tokens = extract_macro_args(line)?.into_iter();
  let mut class = hl::Class::default();
  class.name = tokens
    .next()
    .ok_or_else(|| ParseError::new(format!("missing class name in '{}'", line)))?;
  while let Some(token) = tokens.next() {
    if token == PYB11_SUPERCLASS {
      class.superclass = tokens
        .next()
        .ok_or_else(|| ParseError::new(format!("missing superclass name in '{}'", line)))?;
    }
  }
  Ok(class)
}

pub fn parse_property(line: &str) -> Result<hl::Property, ParseError> {
  let mut tokens = extract_macro_args(line)?.into_iter();
  let mut prop = hl::Property::default();
  prop.kind = tokens
    .next()
    .ok_or_else(|| ParseError::new(format!("missing property type in '{}'", line)))?;
  prop.name = tokens
    .next()
    .ok_or_else(|| ParseError::new(format!("missing property name in '{}'", line)))?;
  while let Some(token) = tokens.next() {
    match token.as_str() {
      PYB11_READ => {
        prop.read = tokens
          .next()
          .ok_or_else(|| ParseError::new(format!("missing READ accessor in '{}'", line)))?;
      }
      PYB11_WRITE => {
        prop.write = tokens
          .next()
          .ok_or_else(|| ParseError::new(format!("missing WRITE accessor in '{}'", line)))?;
      }
      PYB11_CONST_GET_OVERLOAD => prop.is_const_overload = true,
      _ => {}
    }
  }
  Ok(prop)
}

/// Splits a `type,name` macro argument. A `.` inside the type stands for a
/// space (the DSL has no quoting), so it is converted back here.
fn parse_method_arg(arg: &str) -> Result<(String, String), ParseError> {
  let (arg_type, arg_name) = arg
    .split_once(',')
    .ok_or_else(|| ParseError::new(format!("expected 'type,name' in macro argument '{}'", arg)))?;
  Ok((arg_name.to_owned(), arg_type.replace('.', " ")))
}

pub fn parse_method(line: &str) -> Result<hl::Method, ParseError> {
  let mut tokens = extract_macro_args(line)?;
  if tokens.len() < 2 {
    return Err(ParseError::new(format!("missing method return type or name in '{}'", line)));
  }
  let mut method = hl::Method::default();
  method.return_type = tokens.remove(0);
  method.name = tokens.remove(0);

  if tokens.last().map(String::as_str) == Some(PYB11_CONST_METHOD) {
    method.is_const = true;
    tokens.pop();
  }

  if let Some(index) = tokens.iter().position(|it| it == PYB11_RETURN_VALUE_POLICY) {
    if index + 1 >= tokens.len() {
      return Err(ParseError::new(format!("missing return value policy in '{}'", line)));
    }
    method.return_value_policy = tokens.remove(index + 1);
    tokens.remove(index);
  }

  if tokens.is_empty() {
    return Ok(method);
  }

  let token = tokens.remove(0);
  if token == PYB11_ARGS {
    for arg in tokens {
      if arg.contains(',') {
        let (arg_name, arg_type) = parse_method_arg(&arg)?;
        method.args.push(arg_name);
        method.arg_types.push(arg_type);
      } else {
        method.args.push(arg);
      }
    }
  } else if token == PYB11_OVERLOAD {
    method.is_overload = true;
    for arg in tokens {
      let (arg_name, arg_type) = parse_method_arg(&arg)?;
      method.args.push(arg_name);
      method.arg_types.push(arg_type);
    }
  }

  Ok(method)
}

pub fn parse_static_creation(line: &str) -> Result<hl::StaticCreation, ParseError> {
  let mut tokens = extract_macro_args(line)?;
  if tokens.is_empty() {
    return Err(ParseError::new(format!("missing static creation name in '{}'", line)));
  }
  let mut creation = hl::StaticCreation::default();
  creation.name = tokens.remove(0);
  if !tokens.is_empty() {
    let token = tokens.remove(0);
    if token == PYB11_ARGS || token == PYB11_OVERLOAD {
      creation.is_overload = token == PYB11_OVERLOAD;
      creation.args = tokens.into_iter().map(|it| it.replace('.', " ")).collect();
    }
  }
  Ok(creation)
}

pub fn parse_creation(line: &str) -> Result<hl::Constructor, ParseError> {
  let tokens = extract_macro_args(line)?;
  Ok(hl::Constructor {
    args: tokens.into_iter().map(|it| it.replace('.', " ")).collect(),
  })
}

pub fn parse_enumeration(line: &str) -> Result<hl::Enum, ParseError> {
  let mut tokens = extract_macro_args(line)?.into_iter();
  let mut enumeration = hl::Enum::default();
  enumeration.name = tokens
    .next()
    .ok_or_else(|| ParseError::new(format!("missing enumeration name in '{}'", line)))?;
  Ok(enumeration)
}

pub fn parse_field(line: &str) -> Result<hl::Field, ParseError> {
  let tokens = extract_macro_args(line)?;
  match tokens.as_slice() {
    [source] => Ok(hl::Field {
      cpp_name: source.to_owned(),
      py_name: source.to_owned(),
    }),
    [source, exposed] => Ok(hl::Field {
      cpp_name: source.to_owned(),
      py_name: exposed.to_owned(),
    }),
    _ => Err(ParseError::new(format!("incorrect number of arguments for field in '{}'", line))),
  }
}

/// Scans one bindings block starting at the `PYB11_BEGIN_BINDINGS` line.
/// Returns the parsed class and the index of the first line after the block.
pub fn parse_bindings(lines: &[&str], start: usize, origin: &str) -> Result<(hl::Class, usize), ParseError> {
  let mut class = parse_class(lines[start].trim()).map_err(|it| it.at(origin, start + 1))?;

  let mut index = start + 1;
  while index < lines.len() {
    let line = lines[index].trim();
    match classify_line(line) {
      LineKind::EndMarker => return Ok((class, index + 1)),
      LineKind::Property => {
        class.properties.push(parse_property(line).map_err(|it| it.at(origin, index + 1))?);
      }
      LineKind::Method => {
        class.methods.push(parse_method(line).map_err(|it| it.at(origin, index + 1))?);
      }
      LineKind::StaticCreation => {
        class.static_creations.push(parse_static_creation(line).map_err(|it| it.at(origin, index + 1))?);
      }
      LineKind::Creation => {
        class.constructors.push(parse_creation(line).map_err(|it| it.at(origin, index + 1))?);
      }
      LineKind::Enumeration => {
        class.enums.push(parse_enumeration(line).map_err(|it| it.at(origin, index + 1))?);
      }
      LineKind::StaticNewMarker | LineKind::FilterNewMarker => class.has_static_new = true,
      LineKind::SharedPointersMarker => class.uses_shared_pointer = true,
      LineKind::FilterMarker => class.is_filter = true,
      LineKind::CustomMarker => class.is_custom = true,
      LineKind::Field => {
        class.fields.push(parse_field(line).map_err(|it| it.at(origin, index + 1))?);
      }
      // Lines without a recognized prefix are ignored, not an error.
      LineKind::Unrecognized => {}
    }
    index += 1;
  }

  Ok((class, index))
}

/// Finds the literal `enum class <name>` declaration in the line buffer and
/// returns its enumerator names. The body is the text between the opening
/// brace and the first closing brace; enumerators are comma-separated with
/// any `= value` suffix discarded. A missing declaration yields no values.
pub fn find_enum_values(lines: &[&str], name: &str) -> Vec<String> {
  let needle = format!("enum class {}", name);
  let Some(start) = lines.iter().position(|it| it.contains(&needle)) else {
    return Vec::new();
  };

  let mut body = String::new();
  let mut open = false;
  for line in &lines[start..] {
    let mut rest = *line;
    if !open {
      match rest.find('{') {
        Some(pos) => {
          open = true;
          rest = &rest[pos + 1..];
        }
        None => continue,
      }
    }
    match rest.find('}') {
      Some(pos) => {
        body.push_str(&rest[..pos]);
        break;
      }
      None => {
        body.push_str(rest);
        body.push('\n');
      }
    }
  }

  body
    .split(',')
    .filter_map(|it| it.split_whitespace().next())
    .map(ToOwned::to_owned)
    .collect()
}

/// Parses every bindings block in the given source text. The file is held as
/// a single line buffer so the macro pass and the enum literal pass read the
/// same data. `origin` is used for error messages only.
pub fn parse_source(content: &str, origin: &str) -> Result<Vec<hl::Class>, ParseError> {
  let lines: Vec<&str> = content.lines().collect();
  let mut classes = Vec::new();
  let mut index = 0;
  while index < lines.len() {
    if lines[index].trim().starts_with(PYB11_BEGIN_BINDINGS) {
      let (mut class, next) = parse_bindings(&lines, index, origin)?;
      for enumeration in &mut class.enums {
        enumeration.values = find_enum_values(&lines, &enumeration.name);
      }
      trace!("parsed class {} from {}", class.name, origin);
      classes.push(class);
      index = next;
    } else {
      index += 1;
    }
  }
  Ok(classes)
}

pub fn parse_file(path: &Path) -> Result<Vec<hl::Class>, ParseError> {
  let content = fs::read_to_string(path)
    .map_err(|it| ParseError::new(format!("cannot read {}: {}", path.display(), it)))?;
  parse_source(&content, &path.to_string_lossy())
}
