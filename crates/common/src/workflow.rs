//! Workflow descriptors and the registry snapshot used to resolve them

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{ProcessingError, Result};

/// Workflow metadata carried in the registry's `data` (or legacy `meta`) field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMeta {
    #[serde(default)]
    pub input_format: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A named, versioned analysis pipeline registered in the scan API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default, alias = "meta")]
    pub data: WorkflowMeta,
}

/// Immutable snapshot of the workflow registry, fetched once per batch
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: Vec<Workflow>,
    index: HashMap<(String, String), usize>,
}

impl WorkflowRegistry {
    /// Index a registry listing.
    ///
    /// # Errors
    /// Returns [`ProcessingError::AmbiguousWorkflow`] if one (name, version)
    /// pair maps to two different ids.
    pub fn new(workflows: Vec<Workflow>) -> Result<Self> {
        let mut index = HashMap::with_capacity(workflows.len());
        for (position, workflow) in workflows.iter().enumerate() {
            let key = (workflow.name.clone(), workflow.version.clone());
            if let Some(&previous) = index.get(&key) {
                let first: &Workflow = &workflows[previous];
                if first.id != workflow.id {
                    return Err(ProcessingError::AmbiguousWorkflow {
                        name: workflow.name.clone(),
                        version: workflow.version.clone(),
                        first: first.id.clone(),
                        second: workflow.id.clone(),
                    });
                }
                continue;
            }
            index.insert(key, position);
        }
        Ok(Self { workflows, index })
    }

    /// Resolve a workflow by name and version
    pub fn resolve(&self, name: &str, version: &str) -> Result<&Workflow> {
        self.index
            .get(&(name.to_string(), version.to_string()))
            .map(|&i| &self.workflows[i])
            .ok_or_else(|| ProcessingError::WorkflowNotFound {
                name: name.to_string(),
                version: version.to_string(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
