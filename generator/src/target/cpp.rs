use itertools::Itertools;
use pyb11gen_parser::hl::Class;

/*
py::class_<AbstractFilter, Observable, std::shared_ptr<AbstractFilter>> instanceAbstractFilter(mod, "AbstractFilter");
py::enum_<AbstractFilter::Mode> instanceAbstractFilterMode(instanceAbstractFilter, "Mode");

instanceAbstractFilter
  .def(py::init([]()
    {
      return AbstractFilter::New();
    }))
  .def_static("New", &AbstractFilter::New)
  .def_property("Name", &AbstractFilter::getName, &AbstractFilter::setName)
  .def("execute", &AbstractFilter::execute)
;

py::enum_<AbstractFilter::Mode>(instanceAbstractFilter, "Mode")
  .value("Read", AbstractFilter::Mode::Read)
  .value("Write", AbstractFilter::Mode::Write)
;
*/

fn class_template_param(class: &Class) -> String {
  let mut template_param = class.name.to_owned();
  if !class.superclass.is_empty() {
    template_param.push_str(&format!(", {}", class.superclass));
  }
  if class.uses_shared_pointer {
    template_param.push_str(&format!(", std::shared_ptr<{}>", class.name));
  }
  template_param
}

/// Declares the class binding variable (and its nested enum variables) ahead
/// of the binding bodies, so cross-referencing types resolve regardless of
/// registration order.
pub fn generate_forward_declaration(class: &Class) -> String {
  let instance = format!("instance{}", class.name);
  let mut builder = String::new();
  builder.push_str(&format!("py::class_<{}> {}(mod, \"{}\");\n", class_template_param(class), instance, class.name));

  for enumeration in &class.enums {
    let enum_instance = format!("instance{}{}", class.name, enumeration.name);
    builder.push_str(&format!(
      "py::enum_<{}::{}> {}({}, \"{}\");\n",
      class.name, enumeration.name, enum_instance, instance, enumeration.name
    ));
  }

  builder
}

pub fn generate_bindings(class: &Class, forward_declared: bool) -> String {
  let template_param = class_template_param(class);
  let needs_var = !class.constructors.is_empty()
    || class.has_static_new
    || !class.static_creations.is_empty()
    || !class.properties.is_empty()
    || !class.methods.is_empty()
    || !class.fields.is_empty();

  let instance = format!("instance{}", class.name);
  let mut builder = String::new();

  if !forward_declared {
    if !class.enums.is_empty() || class.is_custom {
      builder.push_str(&format!("py::class_<{}> {}(mod, \"{}\");\n", template_param, instance, class.name));
      if needs_var {
        builder.push_str(&format!("{}\n", instance));
      }
    } else {
      builder.push_str(&format!("py::class_<{}>(mod, \"{}\")", template_param, class.name));
      if !needs_var {
        builder.push_str(";");
      }
      builder.push_str("\n");
    }
  } else if needs_var {
    builder.push_str(&format!("{}\n", instance));
  }

  for constructor in &class.constructors {
    builder.push_str(&format!("  .def(py::init<{}>())\n", constructor.args.iter().join(", ")));
  }

  if class.has_static_new {
    builder.push_str(&format!("  .def(py::init([]()\n    {{ \n      return {}::New();\n    }}))\n", class.name));
    builder.push_str(&format!("  .def_static(\"New\", &{}::New)\n", class.name));
  }

  for creation in &class.static_creations {
    if !creation.args.is_empty() {
      let args = creation.args.iter().enumerate().map(|(i, arg)| format!("{} var_{}", arg, i)).join(", ");
      let values = (0..creation.args.len()).map(|i| format!("var_{}", i)).join(", ");
      builder.push_str(&format!(
        "  .def(py::init([]({}) {{\n      return {}::{}({});\n    }}))\n",
        args, class.name, creation.name, values
      ));
    } else {
      builder.push_str(&format!("  .def(py::init(&{}::{}))\n", class.name, creation.name));
    }
    if !creation.is_overload {
      builder.push_str(&format!("  .def_static(\"{}\", &{}::{})\n", creation.name, class.name, creation.name));
    }
  }

  for prop in &class.properties {
    if !prop.read.is_empty() && !prop.write.is_empty() {
      if prop.is_const_overload {
        builder.push_str(&format!(
          "  .def_property(\"{}\", py::overload_cast<>(&{}::{}, py::const_), &{}::{})\n",
          prop.name, class.name, prop.read, class.name, prop.write
        ));
      } else {
        builder.push_str(&format!(
          "  .def_property(\"{}\", &{}::{}, &{}::{})\n",
          prop.name, class.name, prop.read, class.name, prop.write
        ));
      }
    } else if !prop.read.is_empty() {
      builder.push_str(&format!("  .def_property_readonly(\"{}\", &{}::{})\n", prop.name, class.name, prop.read));
    } else if !prop.write.is_empty() {
      // No getter means no attribute round-trip; expose a callable setter instead.
      builder.push_str(&format!(
        "  .def(\"set{}\", &{}::set{}, \"{}\"_a)\n",
        prop.name, class.name, prop.name, prop.name
      ));
    }
  }

  for field in &class.fields {
    builder.push_str(&format!("  .def_readwrite(\"{}\", &{}::{})\n", field.py_name, class.name, field.cpp_name));
  }

  for method in &class.methods {
    if method.is_overload {
      builder.push_str(&format!(
        "  .def(\"{}\", py::overload_cast<{}>(&{}::{}",
        method.name,
        method.arg_types.iter().join(", "),
        class.name,
        method.name
      ));
      if method.is_const {
        builder.push_str(", py::const_");
      }
      builder.push_str(")");
    } else {
      builder.push_str(&format!("  .def(\"{}\", &{}::{}", method.name, class.name, method.name));
    }
    if !method.return_value_policy.is_empty() {
      builder.push_str(&format!(", {}", method.return_value_policy));
    }
    if !method.args.is_empty() {
      builder.push_str(&format!(", {}", method.args.iter().map(|arg| format!("\"{}\"_a", arg)).join(", ")));
    }
    builder.push_str(")\n");
  }

  if needs_var {
    builder.push_str(";\n\n");
  } else {
    builder.push_str("\n");
  }

  for enumeration in &class.enums {
    let enum_instance = format!("instance{}{}", class.name, enumeration.name);
    if !forward_declared {
      builder.push_str(&format!("py::enum_<{}::{}>({}, \"{}\")\n", class.name, enumeration.name, instance, enumeration.name));
    } else {
      builder.push_str(&format!("{}\n", enum_instance));
    }
    for value in &enumeration.values {
      builder.push_str(&format!("  .value(\"{}\", {}::{}::{})\n", value, class.name, enumeration.name, value));
    }
    builder.push_str(";\n\n");
  }

  builder
}
