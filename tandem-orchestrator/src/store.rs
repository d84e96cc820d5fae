//! Job Descriptor Store
//!
//! In-memory registry of job descriptors and pipeline definitions. Entries
//! are write-once: registering an id twice fails with `DuplicateId`, and
//! nothing is ever updated in place. Reads clone out of the lock, so a
//! definition handed to an executor cannot change underneath it.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tandem_core::domain::descriptor::JobDescriptor;
use tandem_core::domain::pipeline::PipelineDefinition;
use tandem_core::{OrchestrationError, Result};
use tandem_lua::Manifest;

const DESCRIPTOR: &str = "job descriptor";
const PIPELINE: &str = "pipeline definition";

#[derive(Debug, Default)]
struct Registry {
    descriptors: HashMap<String, JobDescriptor>,
    pipelines: HashMap<String, PipelineDefinition>,
}

/// Shared registry of descriptors and pipeline definitions
#[derive(Debug, Default)]
pub struct DescriptorStore {
    registry: RwLock<Registry>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job descriptor
    pub fn register(&self, descriptor: JobDescriptor) -> Result<()> {
        descriptor.validate()?;

        let mut registry = self.write();
        if registry.descriptors.contains_key(&descriptor.id) {
            return Err(OrchestrationError::duplicate(DESCRIPTOR, &descriptor.id));
        }

        tracing::info!("Registered job descriptor: {}", descriptor.id);
        registry
            .descriptors
            .insert(descriptor.id.clone(), descriptor);

        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<JobDescriptor> {
        self.read()
            .descriptors
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestrationError::not_found(DESCRIPTOR, id))
    }

    /// All descriptors, sorted by id
    pub fn list(&self) -> Vec<JobDescriptor> {
        let mut descriptors: Vec<_> = self.read().descriptors.values().cloned().collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    /// Registers a pipeline definition
    ///
    /// Every step must already name a registered descriptor.
    pub fn register_pipeline(&self, definition: PipelineDefinition) -> Result<()> {
        let mut registry = self.write();
        if registry.pipelines.contains_key(&definition.id) {
            return Err(OrchestrationError::duplicate(PIPELINE, &definition.id));
        }

        resolve_steps(&registry, &definition)?;

        tracing::info!(
            "Registered pipeline definition: {} ({} steps)",
            definition.id,
            definition.len()
        );
        registry.pipelines.insert(definition.id.clone(), definition);

        Ok(())
    }

    pub fn pipeline(&self, id: &str) -> Result<PipelineDefinition> {
        self.read()
            .pipelines
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestrationError::not_found(PIPELINE, id))
    }

    /// All pipeline definitions, sorted by id
    pub fn list_pipelines(&self) -> Vec<PipelineDefinition> {
        let mut pipelines: Vec<_> = self.read().pipelines.values().cloned().collect();
        pipelines.sort_by(|a, b| a.id.cmp(&b.id));
        pipelines
    }

    /// Resolves a definition's steps to descriptors, in step order
    pub fn validate(&self, definition: &PipelineDefinition) -> Result<Vec<JobDescriptor>> {
        resolve_steps(&self.read(), definition)
    }

    /// Registers every job and then every pipeline of a parsed manifest
    ///
    /// Stops at the first failure; entries registered before it stay.
    pub fn load_manifest(&self, manifest: Manifest) -> Result<(usize, usize)> {
        let jobs = manifest.jobs.len();
        let pipelines = manifest.pipelines.len();

        for descriptor in manifest.jobs {
            self.register(descriptor)?;
        }
        for definition in manifest.pipelines {
            self.register_pipeline(definition)?;
        }

        Ok((jobs, pipelines))
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn resolve_steps(
    registry: &Registry,
    definition: &PipelineDefinition,
) -> Result<Vec<JobDescriptor>> {
    if definition.id.trim().is_empty() {
        return Err(OrchestrationError::invalid(
            &definition.id,
            "pipeline id cannot be empty",
        ));
    }

    if definition.is_empty() {
        return Err(OrchestrationError::invalid(
            &definition.id,
            "pipeline must have at least one step",
        ));
    }

    definition
        .steps
        .iter()
        .map(|step| {
            registry
                .descriptors
                .get(step)
                .cloned()
                .ok_or_else(|| OrchestrationError::not_found(DESCRIPTOR, step))
        })
        .collect()
}
