use itertools::Itertools;
use lazy_static::lazy_static;
use pyb11gen_parser::hl::Class;
use pyb11gen_parser::ParseError;
use regex::Regex;

/*
def abstract_filter(data_container_array, name = None, observer = None) -> int:
  """
  AbstractFilter

  :param data_container_array | DataContainerArray
  :param name | QString Name
  :param observer | Observer
  """

  filter = simpl.AbstractFilter()
  filter.setDataContainerArray(data_container_array)
  if observer is not None:
    filter.connectObserver(observer)
  if name is not None:
    filter.Name = name
  filter.execute()
  return filter.ErrorCode
*/

/// Argument name reserved by every generated wrapper function.
pub const OBSERVER_ARG_NAME: &str = "observer";

lazy_static! {
  static ref CAMEL_BOUNDARY_1: Regex = Regex::new(r"(.)([A-Z][a-z]+)").unwrap();
  static ref CAMEL_BOUNDARY_2: Regex = Regex::new(r"([a-z0-9])([A-Z])").unwrap();
}

pub fn camel_to_snake(text: &str) -> String {
  let result = CAMEL_BOUNDARY_1.replace_all(text, "${1}_${2}");
  CAMEL_BOUNDARY_2.replace_all(&result, "${1}_${2}").to_lowercase()
}

/// Renames identifiers that are Python keywords.
pub fn replace_python_keywords(text: &str) -> String {
  if text == "lambda" {
    return "lambda_value".to_owned();
  }
  text.to_owned()
}

/// Emits the pythonic convenience function for one filter class: a snake_case
/// free function that constructs the filter, assigns the given properties,
/// executes it, and returns the error code.
pub fn generate_python_interface(class: &Class, module_name: &str) -> Result<String, ParseError> {
  let arg_list = class
    .properties
    .iter()
    .map(|it| replace_python_keywords(&camel_to_snake(&it.name)))
    .collect::<Vec<_>>();

  if arg_list.iter().any(|it| it == OBSERVER_ARG_NAME) {
    return Err(ParseError::new(format!(
      "a filter parameter in \"{}\" is called \"{}\" which conflicts with the pythonic interface",
      class.name, OBSERVER_ARG_NAME
    )));
  }

  let parameter_list = arg_list.iter().map(|it| format!("{} = None", it)).join(", ");
  let args_text = if parameter_list.is_empty() {
    String::new()
  } else {
    format!(", {}", parameter_list)
  };

  let mut builder = String::new();
  builder.push_str(&format!(
    "def {}(data_container_array{}, observer = None) -> int:\n",
    camel_to_snake(&class.name),
    args_text
  ));
  builder.push_str("  \"\"\"\n");
  builder.push_str(&format!("  {}\n\n", class.name));
  builder.push_str("  :param data_container_array | DataContainerArray\n");
  for (prop, arg) in class.properties.iter().zip(&arg_list) {
    builder.push_str(&format!("  :param {} | {} {}\n", arg, prop.kind, prop.name));
  }
  builder.push_str("  :param observer | Observer\n");
  builder.push_str("  \"\"\"\n\n");
  builder.push_str(&format!("  filter = {}.{}()\n", module_name, class.name));
  builder.push_str("  filter.setDataContainerArray(data_container_array)\n");
  builder.push_str("  if observer is not None:\n");
  builder.push_str("    filter.connectObserver(observer)\n");

  for (prop, arg) in class.properties.iter().zip(&arg_list) {
    builder.push_str(&format!("  if {} is not None:\n", arg));
    builder.push_str(&format!("    filter.{} = {}\n", prop.name, arg));
  }

  builder.push_str("  filter.execute()\n");
  builder.push_str("  return filter.ErrorCode\n\n");
  Ok(builder)
}

/// Emits the smoke-test snippet for one filter class: construct, preflight,
/// and verify the reflected class name.
pub fn generate_unit_test_snippet(class: &Class, module_name: &str) -> String {
  let mut builder = String::new();
  builder.push_str(&format!("  print('# --- {}')\n", class.name));
  builder.push_str(&format!("  filter = {}.{}()\n", module_name, class.name));
  builder.push_str("  filter.preflight()\n");
  builder.push_str(&format!(
    "  assert filter.NameOfClass == '{}', f'Error: Filter class name is not correct. {{filter.NameOfClass}} != {}'\n\n",
    class.name, class.name
  ));
  builder
}
