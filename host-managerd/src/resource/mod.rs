pub mod application;
pub mod serial;

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use shared::protocol::RESOURCE_ID_SEPARATOR;
use shared::types::{Resource, ResourceBase, ResourceFilter, ResourceType};
use crate::error::{Error, Result};

/// A provider of one resource type. Sub-ids must be unique within the
/// provider.
pub trait ResourceHandler: Send + Sync {
    fn get(&self, cancel: &CancellationToken) -> Result<HashMap<String, ResourceBase>>;
}

/// Dispatches resource queries across the registered resource types.
pub struct ResourceRegistry {
    handlers: HashMap<ResourceType, Arc<dyn ResourceHandler>>,
}

impl ResourceRegistry {
    pub fn new(handlers: HashMap<ResourceType, Arc<dyn ResourceHandler>>) -> Self {
        Self { handlers }
    }

    /// Lists resources of every registered type (or only the filtered one).
    /// Any sub-handler error aborts the whole listing.
    pub fn list(&self, cancel: &CancellationToken, filter: &ResourceFilter) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        for (resource_type, handler) in &self.handlers {
            if filter.resource_type.is_some_and(|t| t != *resource_type) {
                continue;
            }
            for (sub_id, base) in handler.get(cancel)? {
                resources.push(Resource::new(gen_id(*resource_type, &sub_id), *resource_type, base));
            }
        }
        Ok(resources)
    }

    pub fn get(&self, cancel: &CancellationToken, id: &str) -> Result<Resource> {
        let (resource_type, sub_id) = parse_id(id)?;
        let handler = self
            .handlers
            .get(&resource_type)
            .ok_or_else(|| Error::invalid_input(format!("unknown resource type '{}'", resource_type)))?;

        let base = handler
            .get(cancel)?
            .remove(sub_id)
            .ok_or_else(|| Error::not_found(format!("resource '{}' not found", id)))?;

        Ok(Resource::new(id.to_string(), resource_type, base))
    }

    /// Registered resource types
    pub fn handlers(&self) -> Vec<ResourceType> {
        let mut types: Vec<ResourceType> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }
}

fn gen_id(resource_type: ResourceType, sub_id: &str) -> String {
    format!("{}{}{}", resource_type, RESOURCE_ID_SEPARATOR, sub_id)
}

fn parse_id(id: &str) -> Result<(ResourceType, &str)> {
    let parts: Vec<&str> = id.split(RESOURCE_ID_SEPARATOR).collect();
    let [type_tag, sub_id] = parts.as_slice() else {
        return Err(Error::invalid_input(format!("malformed id '{}'", id)));
    };
    let resource_type = type_tag.parse::<ResourceType>().map_err(Error::InvalidInput)?;
    Ok((resource_type, *sub_id))
}
