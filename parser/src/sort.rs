//! Orders parsed classes so that every superclass is emitted before its
//! subclasses. The emitted registration code is textual, so base classes must
//! be declared first across the whole run, not per file.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use tracing::trace;

use crate::hl;
use crate::ParseError;

fn dfs_impl(graph: &HashMap<String, Vec<String>>, vertex: &str, visited: &mut HashSet<String>, path: &mut Vec<String>) {
  visited.insert(vertex.to_owned());
  path.push(vertex.to_owned());

  if let Some(children) = graph.get(vertex) {
    for child in children {
      if !graph.contains_key(child) {
        path.push(child.to_owned());
      } else if !visited.contains(child) {
        dfs_impl(graph, child, visited, path);
      }
    }
  }
}

/// Pre-order traversal of the superclass -> subclasses multimap. The visited
/// set guards against inheritance cycles, which cannot occur in well-formed
/// input but would otherwise recurse forever.
fn dfs(graph: &HashMap<String, Vec<String>>, vertex: &str) -> Vec<String> {
  let mut visited = HashSet::new();
  let mut path = Vec::new();
  dfs_impl(graph, vertex, &mut visited, &mut path);
  path
}

/// True if `child` appears in `parent` as an ordered, not necessarily
/// contiguous, subsequence.
fn is_subsequence(parent: &[String], child: &[String]) -> bool {
  let mut it = parent.iter();
  child.iter().all(|item| it.by_ref().any(|other| other == item))
}

/// Keeps only the maximal paths under subsequence containment. Overlapping
/// traversals from different bases can produce a path that a longer path
/// already covers; emitting both would register classes twice. Equal
/// duplicates keep a single copy.
fn remove_subsumed_paths(mut paths: Vec<Vec<String>>) -> Vec<Vec<String>> {
  paths.sort_by_key(|it| it.len());

  let mut kept = Vec::new();
  for (i, path) in paths.iter().enumerate() {
    let subsumed = paths.iter().enumerate().any(|(j, other)| {
      let outranks = other.len() > path.len() || (other.len() == path.len() && j > i);
      j != i && outranks && is_subsequence(other, path)
    });
    if !subsumed {
      kept.push(path.to_owned());
    }
  }
  kept
}

/// Orders classes so every class follows its superclass. Superclasses that
/// are not themselves part of the parsed set ("foreign roots", base types
/// from outside the annotated headers) only seed the traversal and are
/// dropped from the result. Assumes single inheritance.
pub fn sort_inherited_classes(classes: Vec<hl::Class>) -> Result<Vec<hl::Class>, ParseError> {
  let duplicates = classes.iter().map(|it| it.name.as_str()).duplicates().collect::<Vec<_>>();
  if !duplicates.is_empty() {
    return Err(ParseError::new(format!("duplicate class name(s): {}", duplicates.iter().join(", "))));
  }

  let class_names: HashSet<String> = classes.iter().map(|it| it.name.to_owned()).collect();
  let superclasses: HashSet<&str> = classes.iter().map(|it| it.superclass.as_str()).collect();
  let inherited: HashSet<&str> = superclasses
    .iter()
    .filter(|it| class_names.contains(**it))
    .copied()
    .collect();

  // A class whose declared superclass is foreign (or absent) starts a path.
  let base_classes: Vec<String> = classes
    .iter()
    .filter(|it| !inherited.contains(it.superclass.as_str()))
    .map(|it| it.name.to_owned())
    .collect();

  let mut graph: HashMap<String, Vec<String>> = HashMap::new();
  for class in &classes {
    graph.entry(class.superclass.to_owned()).or_default().push(class.name.to_owned());
  }

  let paths = base_classes.iter().map(|name| dfs(&graph, name)).collect::<Vec<_>>();
  let paths = remove_subsumed_paths(paths);
  trace!("traversal paths: {:?}", paths);

  let input_len = classes.len();
  let mut lookup: HashMap<String, hl::Class> = classes.into_iter().map(|it| (it.name.to_owned(), it)).collect();

  let mut result = Vec::with_capacity(input_len);
  for name in paths.into_iter().flatten() {
    match lookup.remove(&name) {
      Some(class) => result.push(class),
      // Foreign roots seeded the traversal but have no class to emit.
      None if !class_names.contains(&name) => {}
      None => {
        return Err(ParseError::new(format!(
          "class {} visited more than once during inheritance sort; this is a bug in the sorter",
          name
        )));
      }
    }
  }

  if !lookup.is_empty() {
    return Err(ParseError::new(format!(
      "classes missing from sorted output: {}; this is a bug in the sorter",
      lookup.keys().join(", ")
    )));
  }

  Ok(result)
}
