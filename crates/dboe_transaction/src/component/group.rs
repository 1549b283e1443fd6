//! Registered components.

use crate::component::TransactionalComponent;
use crate::error::{TxnError, TxnResult};
use crate::id::ComponentId;
use std::sync::Arc;

/// Components in registration order.
///
/// Every coordinator pass (begin, prepare, commit, abort, complete) walks
/// the group in this order.
#[derive(Clone, Default)]
pub struct ComponentGroup {
    components: Vec<Arc<dyn TransactionalComponent>>,
}

impl ComponentGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a component.
    ///
    /// # Errors
    ///
    /// Returns [`TxnError::DuplicateComponent`] if the id is taken or is
    /// the reserved control id.
    pub fn add(&mut self, component: Arc<dyn TransactionalComponent>) -> TxnResult<()> {
        let id = component.component_id();
        if id.is_control() || self.get(id).is_some() {
            return Err(TxnError::DuplicateComponent { id });
        }
        self.components.push(component);
        Ok(())
    }

    /// Removes and returns the component with `id`. Later components keep
    /// their relative order.
    pub fn remove(&mut self, id: ComponentId) -> Option<Arc<dyn TransactionalComponent>> {
        let index = self.components.iter().position(|c| c.component_id() == id)?;
        Some(self.components.remove(index))
    }

    /// Looks a component up by id.
    #[must_use]
    pub fn get(&self, id: ComponentId) -> Option<&Arc<dyn TransactionalComponent>> {
        self.components.iter().find(|c| c.component_id() == id)
    }

    /// Components in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn TransactionalComponent>> {
        self.components.iter()
    }

    /// Registered ids in order.
    #[must_use]
    pub fn ids(&self) -> Vec<ComponentId> {
        self.components.iter().map(|c| c.component_id()).collect()
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether no component is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl std::fmt::Debug for ComponentGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
