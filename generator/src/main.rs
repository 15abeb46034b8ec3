pub mod target;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use itertools::Itertools;
use pyb11gen_parser::{hl, parse_file, sort::sort_inherited_classes, PYB11_BEGIN_BINDINGS};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::target::cpp::{generate_bindings, generate_forward_declaration};
use crate::target::python::{generate_python_interface, generate_unit_test_snippet};

#[derive(Parser, Debug)]
#[command(version)]
struct Args {
  #[command(subcommand)]
  command: Actions,
}

#[derive(Subcommand, Debug)]
enum Actions {
  /// Generate pybind11 bindings for the main library module
  Library(LibraryArgs),
  /// Generate pybind11 bindings for a plugin module
  Plugin(PluginArgs),
}

#[derive(clap::Args, Debug)]
struct LibraryArgs {
  output_dir: PathBuf,
  /// Semicolon-delimited manifest of candidate header paths
  file_list_path: PathBuf,
  source_dir: PathBuf,
  python_output_dir: PathBuf,

  #[arg(long)]
  header_path: PathBuf,

  #[arg(long)]
  body_path: PathBuf,

  #[arg(long)]
  body_top_path: Option<PathBuf>,

  #[arg(long)]
  post_types_path: Option<PathBuf>,

  /// Accepted for flag parity with the plugin subcommand; the library module
  /// has no plugin to register
  #[arg(long)]
  plugin_name: Option<String>,

  #[arg(long)]
  no_tests: bool,

  #[arg(long)]
  relative_imports: bool,
}

#[derive(clap::Args, Debug)]
struct PluginArgs {
  output_dir: PathBuf,
  /// Newline-delimited manifest of header paths relative to the source dir;
  /// lines starting with '#' are skipped
  file_list_path: PathBuf,
  source_dir: PathBuf,
  python_output_dir: PathBuf,

  #[arg(long)]
  module_name: String,

  #[arg(long)]
  plugin_name: String,

  #[arg(long)]
  include_dir: Option<PathBuf>,

  #[arg(long)]
  header_path: Option<PathBuf>,

  #[arg(long)]
  body_path: Option<PathBuf>,

  #[arg(long)]
  body_top_path: Option<PathBuf>,

  #[arg(long)]
  post_types_path: Option<PathBuf>,

  #[arg(long)]
  no_tests: bool,

  #[arg(long)]
  relative_imports: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let args = Args::parse();
  match &args.command {
    Actions::Library(args) => generate_library_bindings(args),
    Actions::Plugin(args) => generate_plugin_bindings(args),
  }
}

fn is_child_path(child: &Path, parent: &Path) -> bool {
  match (std::path::absolute(child), std::path::absolute(parent)) {
    (Ok(child), Ok(parent)) => child.starts_with(parent),
    _ => false,
  }
}

fn posix_path(path: &Path) -> String {
  path.components().map(|it| it.as_os_str().to_string_lossy()).join("/")
}

/// Library manifests are semicolon-delimited and may list files that carry no
/// annotations at all; keep only headers under the source dir that contain
/// the begin marker but not its `#define`.
fn read_library_file_list(file_list_path: &Path, source_dir: &Path) -> Result<Vec<PathBuf>> {
  let manifest = fs::read_to_string(file_list_path)
    .with_context(|| format!("cannot read file list {}", file_list_path.display()))?;

  let mut files = Vec::new();
  let mut seen = HashSet::new();
  for entry in manifest.split(';') {
    let entry = entry.trim();
    if entry.is_empty() || !entry.contains(".h") {
      continue;
    }
    let path = Path::new(entry);
    if !is_child_path(path, source_dir) {
      continue;
    }
    let data = fs::read_to_string(path).with_context(|| format!("cannot read header {}", path.display()))?;
    if data.contains(PYB11_BEGIN_BINDINGS) && !data.contains(&format!("#define {}", PYB11_BEGIN_BINDINGS)) && seen.insert(path.to_path_buf()) {
      files.push(path.to_path_buf());
    }
  }
  Ok(files)
}

/// Plugin manifests are newline-delimited paths relative to the source dir,
/// with '#' comment lines.
fn read_plugin_file_list(file_list_path: &Path, source_dir: &Path) -> Result<Vec<PathBuf>> {
  let manifest = fs::read_to_string(file_list_path)
    .with_context(|| format!("cannot read file list {}", file_list_path.display()))?;

  Ok(
    manifest
      .lines()
      .map(str::trim)
      .filter(|it| !it.is_empty() && !it.starts_with('#'))
      .map(|it| source_dir.join(it))
      .collect(),
  )
}

/// Parses every header and returns all classes in inheritance order.
fn collect_classes(files: &[PathBuf]) -> Result<Vec<hl::Class>> {
  let mut classes = Vec::new();
  for path in files {
    debug!("parsing {}", path.display());
    classes.extend(parse_file(path)?);
  }
  info!("parsed {} annotated classes from {} headers", classes.len(), files.len());
  Ok(sort_inherited_classes(classes)?)
}

/// Swaps a freshly written temp file into place only when its contents differ
/// from the existing target, so unchanged output never retriggers the
/// surrounding build system.
fn replace_file_if_different(temp_file: &Path, target_file: &Path) -> Result<()> {
  if target_file.exists() {
    let old = fs::read(target_file).with_context(|| format!("cannot read {}", target_file.display()))?;
    let new = fs::read(temp_file).with_context(|| format!("cannot read {}", temp_file.display()))?;
    if old == new {
      fs::remove_file(temp_file).with_context(|| format!("cannot remove {}", temp_file.display()))?;
      return Ok(());
    }
    fs::remove_file(target_file).with_context(|| format!("cannot remove {}", target_file.display()))?;
  }
  fs::rename(temp_file, target_file)
    .with_context(|| format!("cannot move {} into place", target_file.display()))?;
  Ok(())
}

fn write_output(target_file: &Path, contents: &str) -> Result<()> {
  let mut temp_file = target_file.as_os_str().to_owned();
  temp_file.push(".temp");
  let temp_file = PathBuf::from(temp_file);

  fs::write(&temp_file, contents).with_context(|| format!("cannot write {}", temp_file.display()))?;
  replace_file_if_different(&temp_file, target_file)
}

fn read_fragment(path: &Path) -> Result<String> {
  fs::read_to_string(path).with_context(|| format!("cannot read fragment {}", path.display()))
}

fn build_python_module(classes: &[hl::Class], module_name: &str, relative_imports: bool) -> Result<String> {
  let mut builder = String::new();
  if relative_imports {
    builder.push_str(&format!("from . import {}\n\n", module_name));
  } else {
    builder.push_str(&format!("import {}\n\n", module_name));
  }
  for class in classes.iter().filter(|it| it.is_filter) {
    builder.push_str(&generate_python_interface(class, module_name)?);
  }
  Ok(builder)
}

fn build_unit_test(classes: &[hl::Class], module_name: &str) -> String {
  let mut builder = String::new();
  builder.push_str(&format!("import {}\n\n", module_name));
  builder.push_str(&format!("def {}UnitTest():\n", module_name));
  for class in classes.iter().filter(|it| it.is_filter) {
    builder.push_str(&generate_unit_test_snippet(class, module_name));
  }
  builder.push_str("\n");
  builder.push_str("if __name__ == '__main__':\n");
  builder.push_str(&format!("  print('{} UnitTest Starting')\n", module_name));
  builder.push_str(&format!("  {}UnitTest()\n", module_name));
  builder.push_str(&format!("  print('{} UnitTest Complete')\n", module_name));
  builder
}

fn generate_library_bindings(args: &LibraryArgs) -> Result<()> {
  if let Some(name) = &args.plugin_name {
    debug!("ignoring plugin name {} for library generation", name);
  }

  let files = read_library_file_list(&args.file_list_path, &args.source_dir)?;
  let classes = collect_classes(&files)?;

  let mut module = String::new();
  module.push_str(&format!("// This file is automatically generated during build time by {}\n\n", env!("CARGO_PKG_NAME")));
  module.push_str(&read_fragment(&args.header_path)?);
  module.push_str("\n");

  for path in &files {
    let include = path
      .strip_prefix(&args.source_dir)
      .with_context(|| format!("{} is not under {}", path.display(), args.source_dir.display()))?;
    module.push_str(&format!("#include \"{}\"\n", posix_path(include)));
  }

  module.push_str("\nPYBIND11_MODULE(simpl, mod)\n{\n");

  if let Some(path) = &args.body_top_path {
    module.push_str(&format!("{}\n", read_fragment(path)?));
  }

  for class in &classes {
    module.push_str(&generate_forward_declaration(class));
  }

  if let Some(path) = &args.post_types_path {
    module.push_str(&format!("{}\n", read_fragment(path)?));
  }

  for class in &classes {
    module.push_str(&generate_bindings(class, true));
  }

  module.push_str(&read_fragment(&args.body_path)?);
  module.push_str("}\n");

  write_output(&args.output_dir.join("py_simpl.cpp"), &module)?;
  write_output(
    &args.python_output_dir.join("simplpy.py"),
    &build_python_module(&classes, "simpl", args.relative_imports)?,
  )?;
  if !args.no_tests {
    write_output(&args.python_output_dir.join("simpl_UnitTest.py"), &build_unit_test(&classes, "simpl"))?;
  }

  info!("generated library bindings for {} classes", classes.len());
  Ok(())
}

fn generate_plugin_bindings(args: &PluginArgs) -> Result<()> {
  let files = read_plugin_file_list(&args.file_list_path, &args.source_dir)?;
  let classes = collect_classes(&files)?;

  // Plugin includes are re-rooted under the include dir's own name so they
  // resolve against the plugin's include search path.
  let mut includes = Vec::new();
  for path in &files {
    let include = match &args.include_dir {
      Some(include_dir) => {
        let relative = path
          .strip_prefix(include_dir)
          .with_context(|| format!("{} is not under {}", path.display(), include_dir.display()))?;
        let root = include_dir
          .file_name()
          .with_context(|| format!("include dir {} has no final component", include_dir.display()))?;
        Path::new(root).join(relative)
      }
      None => path.to_owned(),
    };
    includes.push(posix_path(&include));
  }

  let custom_header_code = match &args.header_path {
    Some(path) => read_fragment(path)?,
    None => String::new(),
  };
  let custom_body_code = match &args.body_path {
    Some(path) => read_fragment(path)?,
    None => String::new(),
  };

  let core_import = if args.relative_imports { "dream3d.simpl" } else { "simpl" };

  let module_name = &args.module_name;
  let plugin_name = &args.plugin_name;

  let mut module = String::new();
  module.push_str(&format!("// This file is automatically generated during build time by {}\n\n", env!("CARGO_PKG_NAME")));
  module.push_str("#include <memory>\n\n");
  module.push_str("#include <pybind11/pybind11.h>\n\n");
  module.push_str("#include \"SIMPLib/Filtering/FilterManager.h\"\n\n");
  module.push_str(&format!("#include \"{}/{}Plugin.h\"\n\n", plugin_name, plugin_name));
  module.push_str("#include \"Binding/Pybind11CustomTypeCasts.h\"\n\n");
  module.push_str(&format!("{}\n", custom_header_code));
  module.push_str(&includes.iter().map(|it| format!("#include \"{}\"", it)).join("\n"));
  module.push_str("\n\n");
  module.push_str("namespace py = pybind11;\n");
  module.push_str("using namespace py::literals;\n\n");
  module.push_str(&format!("PYBIND11_MODULE({}, mod)\n{{\n", module_name));
  module.push_str(&format!("py::module::import(\"{}\");\n\n", core_import));

  if let Some(path) = &args.body_top_path {
    module.push_str(&format!("{}\n", read_fragment(path)?));
  }

  for class in &classes {
    module.push_str(&generate_forward_declaration(class));
  }

  if let Some(path) = &args.post_types_path {
    module.push_str(&format!("{}\n", read_fragment(path)?));
  }

  for class in &classes {
    module.push_str(&generate_bindings(class, true));
  }

  module.push_str(&format!("{}\n", custom_body_code));
  module.push_str("  //Ensure all the filters are loaded when this module loads\n");
  module.push_str("  py::module_ os = py::module_::import(\"os\");\n");
  module.push_str("  auto env_value = os.attr(\"getenv\")(\"DREAM3D_PLUGINS_LOADED\");\n");
  module.push_str("  if(env_value.is_none())\n");
  module.push_str("  {\n");
  module.push_str(&format!("    {}Plugin {}Plugin;\n", plugin_name, module_name));
  module.push_str(&format!("    {}Plugin.registerFilters(FilterManager::Instance());\n", module_name));
  module.push_str("  }\n");
  module.push_str("\n}\n");

  write_output(&args.output_dir.join(format!("py_{}.cpp", module_name)), &module)?;
  write_output(
    &args.python_output_dir.join(format!("{}py.py", module_name)),
    &build_python_module(&classes, module_name, args.relative_imports)?,
  )?;
  if !args.no_tests {
    write_output(
      &args.python_output_dir.join(format!("{}_UnitTest.py", module_name)),
      &build_unit_test(&classes, module_name),
    )?;
  }

  info!("generated plugin bindings for {} classes in module {}", classes.len(), module_name);
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[test]
  fn parse_library_args() {
    let args = Args::parse_from([
      "pyb11gen",
      "library",
      "out",
      "files.txt",
      "src",
      "py_out",
      "--header-path",
      "header.cpp",
      "--body-path",
      "body.cpp",
      "--no-tests",
    ]);
    let Actions::Library(args) = args.command else {
      panic!("expected library subcommand");
    };
    assert_eq!(args.output_dir, PathBuf::from("out"));
    assert_eq!(args.header_path, PathBuf::from("header.cpp"));
    assert!(args.no_tests);
    assert!(!args.relative_imports);
  }

  #[test]
  fn parse_plugin_args() {
    let args = Args::parse_from([
      "pyb11gen",
      "plugin",
      "out",
      "files.txt",
      "src",
      "py_out",
      "--module-name",
      "itkimageprocessing",
      "--plugin-name",
      "ITKImageProcessing",
      "--relative-imports",
    ]);
    let Actions::Plugin(args) = args.command else {
      panic!("expected plugin subcommand");
    };
    assert_eq!(args.module_name, "itkimageprocessing");
    assert_eq!(args.plugin_name, "ITKImageProcessing");
    assert!(args.relative_imports);
  }

  #[test]
  fn plugin_requires_module_name() {
    let result = Args::try_parse_from(["pyb11gen", "plugin", "out", "files.txt", "src", "py_out", "--plugin-name", "X"]);
    assert!(result.is_err());
  }

  #[test]
  fn library_requires_header_and_body() {
    let result = Args::try_parse_from(["pyb11gen", "library", "out", "files.txt", "src", "py_out"]);
    assert!(result.is_err());
  }

  #[test]
  fn plugin_file_list() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("files.txt");
    fs::write(&manifest, "# comment\nFilters/FirstFilter.h\n\nFilters/SecondFilter.h\n").unwrap();

    let files = read_plugin_file_list(&manifest, Path::new("/plugin/src")).unwrap();
    assert_eq!(
      files,
      vec![
        PathBuf::from("/plugin/src/Filters/FirstFilter.h"),
        PathBuf::from("/plugin/src/Filters/SecondFilter.h"),
      ]
    );
  }

  #[test]
  fn library_file_list_filters_headers() {
    let dir = tempfile::tempdir().unwrap();
    let source_dir = dir.path();

    let annotated = source_dir.join("Annotated.h");
    fs::write(&annotated, "PYB11_BEGIN_BINDINGS(Annotated)\nPYB11_END_BINDINGS()\n").unwrap();
    let plain = source_dir.join("Plain.h");
    fs::write(&plain, "class Plain {};\n").unwrap();
    let macros = source_dir.join("PyB11Macros.h");
    fs::write(&macros, "#define PYB11_BEGIN_BINDINGS(...)\n").unwrap();

    let manifest = dir.path().join("files.txt");
    fs::write(
      &manifest,
      format!("{};{};{};{}", annotated.display(), plain.display(), macros.display(), annotated.display()),
    )
    .unwrap();

    let files = read_library_file_list(&manifest, source_dir).unwrap();
    assert_eq!(files, vec![annotated]);
  }

  #[test]
  fn unchanged_output_is_not_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("py_simpl.cpp");

    write_output(&target, "generated\n").unwrap();
    let first_modified = fs::metadata(&target).unwrap().modified().unwrap();

    std::thread::sleep(Duration::from_millis(50));
    write_output(&target, "generated\n").unwrap();
    let second_modified = fs::metadata(&target).unwrap().modified().unwrap();

    assert_eq!(fs::read_to_string(&target).unwrap(), "generated\n");
    assert_eq!(first_modified, second_modified);
    assert!(!dir.path().join("py_simpl.cpp.temp").exists());

    write_output(&target, "changed\n").unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "changed\n");
  }

  #[test]
  fn posix_paths() {
    assert_eq!(posix_path(Path::new("a/b/c.h")), "a/b/c.h");
  }

  #[test]
  fn python_module_contents() {
    let classes = vec![
      hl::Class {
        name: "GenericFilter".to_owned(),
        is_filter: true,
        ..hl::Class::default()
      },
      hl::Class {
        name: "NotAFilter".to_owned(),
        ..hl::Class::default()
      },
    ];

    let code = build_python_module(&classes, "simpl", false).unwrap();
    assert!(code.starts_with("import simpl\n\n"));
    assert!(code.contains("def generic_filter(data_container_array, observer = None) -> int:\n"));
    assert!(!code.contains("not_a_filter"));

    let code = build_python_module(&classes, "simpl", true).unwrap();
    assert!(code.starts_with("from . import simpl\n\n"));
  }

  #[test]
  fn unit_test_contents() {
    let classes = vec![hl::Class {
      name: "GenericFilter".to_owned(),
      is_filter: true,
      ..hl::Class::default()
    }];

    let code = build_unit_test(&classes, "simpl");
    assert!(code.starts_with("import simpl\n\ndef simplUnitTest():\n"));
    assert!(code.contains("  filter = simpl.GenericFilter()\n"));
    assert!(code.ends_with("if __name__ == '__main__':\n  print('simpl UnitTest Starting')\n  simplUnitTest()\n  print('simpl UnitTest Complete')\n"));
  }

  #[test]
  fn end_to_end_plugin_generation() {
    let dir = tempfile::tempdir().unwrap();
    let source_dir = dir.path().join("src");
    let output_dir = dir.path().join("out");
    let python_output_dir = dir.path().join("py_out");
    fs::create_dir_all(source_dir.join("Filters")).unwrap();
    fs::create_dir_all(&output_dir).unwrap();
    fs::create_dir_all(&python_output_dir).unwrap();

    fs::write(
      source_dir.join("Filters/BaseFilter.h"),
      "PYB11_BEGIN_BINDINGS(BaseFilter SUPERCLASS AbstractFilter)\nPYB11_SHARED_POINTERS()\nPYB11_FILTER_NEW_MACRO(BaseFilter)\nPYB11_FILTER()\nPYB11_PROPERTY(int Seed READ getSeed WRITE setSeed)\nPYB11_END_BINDINGS()\n",
    )
    .unwrap();
    fs::write(
      source_dir.join("Filters/DerivedFilter.h"),
      "PYB11_BEGIN_BINDINGS(DerivedFilter SUPERCLASS BaseFilter)\nPYB11_SHARED_POINTERS()\nPYB11_FILTER_NEW_MACRO(DerivedFilter)\nPYB11_FILTER()\nPYB11_END_BINDINGS()\n",
    )
    .unwrap();

    let manifest = dir.path().join("files.txt");
    // Derived listed first; the sorter must still emit Base first.
    fs::write(&manifest, "Filters/DerivedFilter.h\nFilters/BaseFilter.h\n").unwrap();

    let args = PluginArgs {
      output_dir: output_dir.clone(),
      file_list_path: manifest,
      source_dir,
      python_output_dir: python_output_dir.clone(),
      module_name: "testplugin".to_owned(),
      plugin_name: "TestPlugin".to_owned(),
      include_dir: None,
      header_path: None,
      body_path: None,
      body_top_path: None,
      post_types_path: None,
      no_tests: false,
      relative_imports: false,
    };
    generate_plugin_bindings(&args).unwrap();

    let module = fs::read_to_string(output_dir.join("py_testplugin.cpp")).unwrap();
    assert!(module.contains("PYBIND11_MODULE(testplugin, mod)"));
    let base = module.find("instanceBaseFilter(mod").unwrap();
    let derived = module.find("instanceDerivedFilter(mod").unwrap();
    assert!(base < derived);
    assert!(module.contains("TestPlugin/TestPluginPlugin.h"));
    assert!(module.contains("TestPluginPlugin testpluginPlugin;"));

    let python = fs::read_to_string(python_output_dir.join("testpluginpy.py")).unwrap();
    assert!(python.contains("def base_filter(data_container_array, seed = None, observer = None) -> int:"));
    assert!(python.contains("def derived_filter(data_container_array, observer = None) -> int:"));

    let test = fs::read_to_string(python_output_dir.join("testplugin_UnitTest.py")).unwrap();
    assert!(test.contains("def testpluginUnitTest():"));
  }
}
