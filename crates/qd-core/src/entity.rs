//! Entities and the entity registry

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Topological dimension of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Dimension {
    Point = 0,
    Line = 1,
    Surface = 2,
    Solid = 3,
}

impl Dimension {
    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Dimension::Point => "point",
            Dimension::Line => "line",
            Dimension::Surface => "surface",
            Dimension::Solid => "solid",
        }
    }
}

/// Mask layer and datatype (used by layout backends)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layer {
    pub layer: u16,
    pub datatype: u16,
}

impl Layer {
    pub fn new(layer: u16, datatype: u16) -> Self {
        Self { layer, datatype }
    }
}

impl Default for Layer {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

/// A named geometric object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Uuid,
    pub name: String,
    pub dimension: Dimension,
    pub layer: Layer,
    /// Set once the entity is the result of a boolean operation
    pub is_boolean: bool,
    /// Set when the entity, or any constituent of it, has rounded corners
    pub is_fillet: bool,
}

impl Entity {
    /// Create a new entity on the default layer
    pub fn new(name: impl Into<String>, dimension: Dimension) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            dimension,
            layer: Layer::default(),
            is_boolean: false,
            is_fillet: false,
        }
    }

    /// Set the layer
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }
}

/// Entity registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity name already in use: {0}")]
    NameTaken(String),
}

/// Name-keyed store of entities
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<Uuid, Entity>,
    /// Name to ID index (O(1) lookup)
    name_index: HashMap<String, Uuid>,
}

impl EntityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check if a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    /// Register an entity, returning its ID
    pub fn insert(&mut self, entity: Entity) -> Result<Uuid, EntityError> {
        if self.name_index.contains_key(&entity.name) {
            return Err(EntityError::NameTaken(entity.name));
        }
        let id = entity.id;
        self.name_index.insert(entity.name.clone(), id);
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// Get an entity by name
    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.name_index
            .get(name)
            .and_then(|id| self.entities.get(id))
    }

    /// Get a mutable entity by name
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Entity> {
        let id = self.name_index.get(name)?;
        self.entities.get_mut(id)
    }

    /// Get an entity by ID
    pub fn get_by_id(&self, id: Uuid) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Remove an entity by name
    pub fn remove(&mut self, name: &str) -> Option<Entity> {
        let id = self.name_index.remove(name)?;
        self.entities.remove(&id)
    }

    /// Rename an entity
    pub fn rename(&mut self, name: &str, new_name: &str) -> Result<(), EntityError> {
        if name == new_name {
            return Ok(());
        }
        if self.name_index.contains_key(new_name) {
            return Err(EntityError::NameTaken(new_name.to_string()));
        }
        let id = self
            .name_index
            .remove(name)
            .ok_or_else(|| EntityError::NotFound(name.to_string()))?;
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.name = new_name.to_string();
        }
        self.name_index.insert(new_name.to_string(), id);
        Ok(())
    }

    /// Register a copy of an entity under a new name.
    ///
    /// The copy gets a fresh ID but keeps dimension, layer and flags.
    pub fn copy(&mut self, name: &str, new_name: &str) -> Result<Uuid, EntityError> {
        let source = self
            .get(name)
            .ok_or_else(|| EntityError::NotFound(name.to_string()))?;
        let copy = Entity {
            id: Uuid::new_v4(),
            name: new_name.to_string(),
            ..source.clone()
        };
        self.insert(copy)
    }

    /// First free name of the form `base_1`, `base_2`, ...
    pub fn unique_name(&self, base: &str) -> String {
        (1..)
            .map(|i| format!("{}_{}", base, i))
            .find(|candidate| !self.name_index.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.name_index.keys().cloned().collect();
        names.sort();
        names
    }

    /// Iterate over all entities
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }
}
