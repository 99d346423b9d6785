//! The descriptor store: definitions keyed by name, the alias table, and
//! the merged-definition cache with parent-chain flattening.

use crate::definition::{ComponentDefinition, Creator, MergedDefinition};
use crate::error::{ContainerError, Result};

use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;

pub(crate) struct DefinitionRegistry {
  definitions: DashMap<String, Arc<ComponentDefinition>, RandomState>,
  aliases: DashMap<String, String, RandomState>,
  /// Flattened definitions, computed lazily and discarded wholesale on any
  /// registry mutation so readers never see a stale parent chain.
  merged: DashMap<String, Arc<MergedDefinition>, RandomState>,
  /// Declaration order; drives eager initialization and candidate
  /// enumeration order.
  order: Mutex<Vec<String>>,
}

impl DefinitionRegistry {
  pub(crate) fn new() -> Self {
    Self {
      definitions: DashMap::with_hasher(RandomState::new()),
      aliases: DashMap::with_hasher(RandomState::new()),
      merged: DashMap::with_hasher(RandomState::new()),
      order: Mutex::new(Vec::new()),
    }
  }

  /// Inserts or replaces a definition. Readers only ever observe whole
  /// `Arc`-swapped values, never a partially written one.
  pub(crate) fn register(&self, name: &str, definition: ComponentDefinition) -> Result<()> {
    definition.validate(name)?;
    if self.aliases.contains_key(name) {
      return Err(ContainerError::InvalidRegistration {
        name: name.to_string(),
        reason: "name is already in use as an alias".to_string(),
      });
    }
    let replaced = self
      .definitions
      .insert(name.to_string(), Arc::new(definition))
      .is_some();
    if !replaced {
      self.order.lock().push(name.to_string());
    }
    self.merged.clear();
    Ok(())
  }

  pub(crate) fn remove(&self, name: &str) -> Result<()> {
    if self.definitions.remove(name).is_none() {
      return Err(ContainerError::NotFound(name.to_string()));
    }
    self.order.lock().retain(|existing| existing != name);
    self.merged.clear();
    Ok(())
  }

  /// Follows the alias chain to the canonical component name. Cycle-free
  /// by construction (`alias` refuses to close a loop), but bounded by a
  /// visited list regardless.
  pub(crate) fn canonical_name(&self, name: &str) -> String {
    let mut current = name.to_string();
    let mut visited: Vec<String> = Vec::new();
    while let Some(next) = self.aliases.get(&current).map(|entry| entry.value().clone()) {
      if visited.iter().any(|seen| *seen == next) {
        break;
      }
      visited.push(current);
      current = next;
    }
    current
  }

  pub(crate) fn get(&self, name: &str) -> Result<Arc<ComponentDefinition>> {
    let canonical = self.canonical_name(name);
    self
      .definitions
      .get(&canonical)
      .map(|entry| entry.value().clone())
      .ok_or_else(|| ContainerError::NotFound(name.to_string()))
  }

  pub(crate) fn contains(&self, name: &str) -> bool {
    self.definitions.contains_key(&self.canonical_name(name))
  }

  pub(crate) fn names(&self) -> Vec<String> {
    self.order.lock().clone()
  }

  pub(crate) fn count(&self) -> usize {
    self.definitions.len()
  }

  /// Registers `alias` for `canonical`. An alias may not shadow a
  /// definition name and may not close a resolution cycle; re-registering
  /// an alias replaces its target.
  pub(crate) fn alias(&self, alias: &str, canonical: &str) -> Result<()> {
    if alias.is_empty() || canonical.is_empty() {
      return Err(ContainerError::InvalidRegistration {
        name: alias.to_string(),
        reason: "alias and target must not be empty".to_string(),
      });
    }
    if alias == canonical {
      // A name trivially resolves to itself; nothing to record.
      return Ok(());
    }
    if self.definitions.contains_key(alias) {
      return Err(ContainerError::InvalidRegistration {
        name: alias.to_string(),
        reason: "alias would shadow a registered component name".to_string(),
      });
    }
    if self.chain_contains(canonical, alias) {
      return Err(ContainerError::InvalidRegistration {
        name: alias.to_string(),
        reason: format!("alias cycle: `{canonical}` already resolves through `{alias}`"),
      });
    }
    self.aliases.insert(alias.to_string(), canonical.to_string());
    Ok(())
  }

  /// Whether walking the alias chain from `start` passes through `needle`.
  fn chain_contains(&self, start: &str, needle: &str) -> bool {
    let mut current = start.to_string();
    let mut hops = 0usize;
    loop {
      if current == needle {
        return true;
      }
      match self.aliases.get(&current).map(|entry| entry.value().clone()) {
        Some(next) if hops < self.aliases.len() => {
          current = next;
          hops += 1;
        }
        _ => return false,
      }
    }
  }

  pub(crate) fn is_alias(&self, name: &str) -> bool {
    self.aliases.contains_key(name)
  }

  /// Every alias that (transitively) resolves to the same canonical name.
  pub(crate) fn aliases_of(&self, name: &str) -> Vec<String> {
    let canonical = self.canonical_name(name);
    let entries: Vec<String> = self.aliases.iter().map(|entry| entry.key().clone()).collect();
    entries
      .into_iter()
      .filter(|alias| alias != name && self.canonical_name(alias) == canonical)
      .collect()
  }

  /// Returns the flattened definition for `name`, walking the parent chain
  /// with child fields overriding parent fields. Constructor arguments
  /// merge by index and properties by name, child entries winning.
  pub(crate) fn merged(&self, name: &str) -> Result<Arc<MergedDefinition>> {
    let canonical = self.canonical_name(name);
    if let Some(cached) = self.merged.get(&canonical).map(|entry| entry.value().clone()) {
      return Ok(cached);
    }
    let computed = Arc::new(self.compute_merged(&canonical)?);
    self.merged.insert(canonical, computed.clone());
    Ok(computed)
  }

  fn compute_merged(&self, name: &str) -> Result<MergedDefinition> {
    // Collect the chain child-first, rejecting cycles and dangling parents.
    let child = self
      .definitions
      .get(name)
      .map(|entry| entry.value().clone())
      .ok_or_else(|| ContainerError::NotFound(name.to_string()))?;
    let mut chain: Vec<Arc<ComponentDefinition>> = vec![child.clone()];
    let mut visited: Vec<String> = vec![name.to_string()];
    let mut cursor = child.parent.clone();
    while let Some(parent_name) = cursor {
      let parent_canonical = self.canonical_name(&parent_name);
      if visited.iter().any(|seen| *seen == parent_canonical) {
        return Err(ContainerError::InvalidRegistration {
          name: name.to_string(),
          reason: format!("definition inheritance cycle through `{parent_canonical}`"),
        });
      }
      let parent = self
        .definitions
        .get(&parent_canonical)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| ContainerError::InvalidRegistration {
          name: name.to_string(),
          reason: format!("parent definition `{parent_name}` is not registered"),
        })?;
      visited.push(parent_canonical);
      chain.push(parent.clone());
      cursor = parent.parent.clone();
    }

    // Fold eldest-first so each child level overrides its ancestors.
    let mut acc = ComponentDefinition::default();
    for definition in chain.iter().rev() {
      overlay(&mut acc, definition);
    }
    acc.constructor_args.sort_by_key(|arg| arg.index);

    Ok(MergedDefinition {
      name: name.to_string(),
      type_key: acc.type_key,
      scope: acc.scope.unwrap_or_default(),
      lazy_init: acc.lazy_init.unwrap_or(false),
      depends_on: acc.depends_on,
      autowire_candidate: acc.autowire_candidate.unwrap_or(true),
      primary: acc.primary.unwrap_or(false),
      role: acc.role.unwrap_or_default(),
      // The abstract flag is never inherited: it describes the definition
      // itself, not the template it came from.
      is_abstract: child.is_abstract,
      creator: acc.creator,
      constructor_args: acc.constructor_args,
      properties: acc.properties,
      init_hook: acc.init_hook,
      destroy_hook: acc.destroy_hook,
      bindings: acc.bindings,
      factory: acc.factory,
    })
  }
}

fn overlay(acc: &mut ComponentDefinition, definition: &ComponentDefinition) {
  if definition.type_key.is_some() {
    acc.type_key = definition.type_key;
  }
  if let Some(scope) = &definition.scope {
    acc.scope = Some(scope.clone());
  }
  if definition.lazy_init.is_some() {
    acc.lazy_init = definition.lazy_init;
  }
  if !definition.depends_on.is_empty() {
    acc.depends_on = definition.depends_on.clone();
  }
  if definition.autowire_candidate.is_some() {
    acc.autowire_candidate = definition.autowire_candidate;
  }
  if definition.primary.is_some() {
    acc.primary = definition.primary;
  }
  if definition.role.is_some() {
    acc.role = definition.role;
  }
  if !matches!(definition.creator, Creator::Inherited) {
    acc.creator = definition.creator.clone();
  }
  for arg in &definition.constructor_args {
    acc.constructor_args.retain(|existing| existing.index != arg.index);
    acc.constructor_args.push(arg.clone());
  }
  for property in &definition.properties {
    acc.properties.retain(|existing| existing.name != property.name);
    acc.properties.push(property.clone());
  }
  if definition.init_hook.is_some() {
    acc.init_hook = definition.init_hook.clone();
  }
  if definition.destroy_hook.is_some() {
    acc.destroy_hook = definition.destroy_hook.clone();
  }
  for binding in &definition.bindings {
    acc.bindings.retain(|existing| existing.key != binding.key);
    acc.bindings.push(binding.clone());
  }
  if definition.factory.is_some() {
    acc.factory = definition.factory.clone();
  }
}
