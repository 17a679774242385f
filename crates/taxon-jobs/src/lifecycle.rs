//! Resource group deletion and reprocessing.
//!
//! A logical group is a root resource plus every resource whose
//! `origin_file_id` points at it. All members share one stored file, which is
//! only removed from storage once nothing references its path any more.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use taxon_core::{Error, Resource, Result};

use crate::pipeline::{
    validate_override, PipelineOutcome, ProcessOptions, ProcessingPipeline, ProgressSink,
};

/// Result of deleting a resource group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Resource ids removed from the repository.
    pub deleted: Vec<Uuid>,
    /// Stored paths removed from storage.
    pub files_removed: Vec<String>,
}

/// Deletes and reprocesses resources as whole groups.
#[derive(Clone)]
pub struct ResourceLifecycle {
    pipeline: Arc<ProcessingPipeline>,
}

impl ResourceLifecycle {
    pub fn new(pipeline: Arc<ProcessingPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<ProcessingPipeline> {
        &self.pipeline
    }

    async fn require(&self, id: Uuid) -> Result<Resource> {
        self.pipeline
            .resources()
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("resource {}", id)))
    }

    /// Members of the group `resource` belongs to.
    ///
    /// When the root record no longer exists the group is every sibling that
    /// shares the same `origin_file_id`.
    async fn group_of(&self, resource: Resource) -> Result<Vec<Resource>> {
        let repo = self.pipeline.resources();
        let root_id = resource.root_id();
        let mut group = Vec::new();
        if root_id == resource.id {
            group.push(resource);
        } else if let Some(root) = repo.get(root_id).await? {
            group.push(root);
        }
        for member in repo.list_by_origin(root_id).await? {
            if !group.iter().any(|r| r.id == member.id) {
                group.push(member);
            }
        }
        Ok(group)
    }

    /// Delete `id` together with its whole group.
    #[instrument(skip(self), fields(subsystem = "lifecycle", op = "delete"))]
    pub async fn delete_resource(&self, id: Uuid) -> Result<DeleteReport> {
        let resource = self.require(id).await?;
        let group = self.group_of(resource).await?;
        let repo = self.pipeline.resources();

        let mut report = DeleteReport::default();
        let mut paths: Vec<String> = Vec::new();
        for member in &group {
            if repo.delete(member.id).await? {
                report.deleted.push(member.id);
            }
            if !paths.contains(&member.stored_path) {
                paths.push(member.stored_path.clone());
            }
        }

        let storage = self.pipeline.storage();
        for path in paths {
            let remaining = repo.count_by_stored_path(&path).await?;
            if remaining > 0 {
                debug!(stored_path = %path, remaining, "Stored file still referenced, keeping");
                continue;
            }
            match storage.delete(&path).await {
                Ok(true) => report.files_removed.push(path),
                Ok(false) => debug!(stored_path = %path, "Stored file already gone"),
                Err(e) => warn!(stored_path = %path, error = %e, "Failed to remove stored file"),
            }
        }

        info!(
            resource_id = %id,
            deleted = report.deleted.len(),
            files_removed = report.files_removed.len(),
            "Resource group deleted"
        );
        Ok(report)
    }

    /// Reset the root of `id`'s group to `PENDING` and drop its split
    /// children. Returns the reset root.
    pub async fn reset(&self, id: Uuid) -> Result<Resource> {
        let resource = self.require(id).await?;
        let repo = self.pipeline.resources();
        let mut root = match resource.origin_file_id {
            Some(root_id) => self.require(root_id).await?,
            None => resource,
        };

        let children = repo.list_by_origin(root.id).await?;
        for child in &children {
            repo.delete(child.id).await?;
        }

        root.reset_derived();
        repo.update(&root).await?;
        debug!(
            resource_id = %root.id,
            children_removed = children.len(),
            "Resource reset"
        );
        Ok(root)
    }

    /// Reset and rerun the pipeline, optionally forcing a concept.
    ///
    /// The rerun takes the same route as the first run: captured pages go
    /// back through the vision round unless a concept is forced, and uploads
    /// keep their original path for pattern matching.
    #[instrument(skip(self, progress), fields(subsystem = "lifecycle", op = "reprocess"))]
    pub async fn reprocess(
        &self,
        id: Uuid,
        concept_override: Option<String>,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineOutcome> {
        if let Some(concept_id) = concept_override.as_deref() {
            let ontology = self.pipeline.ontology().snapshot().await?;
            validate_override(&ontology, concept_id)?;
        }

        let root = self.reset(id).await?;
        match (concept_override, root.source_url.as_deref()) {
            (None, Some(url)) => self.pipeline.process_capture(root.id, url, progress).await,
            (concept_override, _) => {
                let options = ProcessOptions {
                    concept_override,
                    source_path: root.source_path.clone(),
                };
                self.pipeline.process(root.id, options, progress).await
            }
        }
    }
}
