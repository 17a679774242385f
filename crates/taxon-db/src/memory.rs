//! In-memory repositories.
//!
//! Behave like the PostgreSQL repositories (ordering, not-found handling,
//! status transitions) and back unit and integration tests as well as local
//! runs without a database. Always compiled so downstream crates' tests can
//! use them.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use taxon_core::{
    Concept, EmbeddedType, Error, JobRepository, JobStatus, Mixin, OntologyRepository,
    ProcessingJob, QueueStats, Resource, ResourceRepository, Result,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// ONTOLOGY
// =============================================================================

#[derive(Debug, Default)]
struct OntologyState {
    concepts: Vec<Concept>,
    mixins: Vec<Mixin>,
    embedded_types: Vec<EmbeddedType>,
}

/// In-memory [`OntologyRepository`]. Lists preserve insertion order.
#[derive(Debug, Default)]
pub struct MemoryOntologyRepository {
    state: Mutex<OntologyState>,
}

impl MemoryOntologyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OntologyRepository for MemoryOntologyRepository {
    async fn list_concepts(&self) -> Result<Vec<Concept>> {
        Ok(lock(&self.state).concepts.clone())
    }

    async fn get_concept(&self, id: &str) -> Result<Option<Concept>> {
        Ok(lock(&self.state).concepts.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_concept(&self, concept: &Concept) -> Result<()> {
        let mut state = lock(&self.state);
        if state.concepts.iter().any(|c| c.id == concept.id) {
            return Err(Error::AlreadyExists(format!("concept '{}'", concept.id)));
        }
        state.concepts.push(concept.clone());
        Ok(())
    }

    async fn update_concept(&self, concept: &Concept) -> Result<()> {
        let mut state = lock(&self.state);
        let slot = state
            .concepts
            .iter_mut()
            .find(|c| c.id == concept.id)
            .ok_or_else(|| Error::NotFound(format!("concept '{}'", concept.id)))?;
        *slot = concept.clone();
        Ok(())
    }

    async fn delete_concept(&self, id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let before = state.concepts.len();
        state.concepts.retain(|c| c.id != id);
        if state.concepts.len() == before {
            return Err(Error::NotFound(format!("concept '{}'", id)));
        }
        Ok(())
    }

    async fn count_children(&self, id: &str) -> Result<i64> {
        Ok(lock(&self.state)
            .concepts
            .iter()
            .filter(|c| c.inherits.as_deref() == Some(id))
            .count() as i64)
    }

    async fn list_mixins(&self) -> Result<Vec<Mixin>> {
        Ok(lock(&self.state).mixins.clone())
    }

    async fn upsert_mixin(&self, mixin: &Mixin) -> Result<()> {
        let mut state = lock(&self.state);
        match state.mixins.iter_mut().find(|m| m.id == mixin.id) {
            Some(slot) => *slot = mixin.clone(),
            None => state.mixins.push(mixin.clone()),
        }
        Ok(())
    }

    async fn list_embedded_types(&self) -> Result<Vec<EmbeddedType>> {
        Ok(lock(&self.state).embedded_types.clone())
    }

    async fn upsert_embedded_type(&self, embedded_type: &EmbeddedType) -> Result<()> {
        let mut state = lock(&self.state);
        match state
            .embedded_types
            .iter_mut()
            .find(|t| t.id == embedded_type.id)
        {
            Some(slot) => *slot = embedded_type.clone(),
            None => state.embedded_types.push(embedded_type.clone()),
        }
        Ok(())
    }
}

// =============================================================================
// RESOURCES
// =============================================================================

/// In-memory [`ResourceRepository`].
#[derive(Debug, Default)]
pub struct MemoryResourceRepository {
    resources: Mutex<Vec<Resource>>,
}

impl MemoryResourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        lock(&self.resources).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResourceRepository for MemoryResourceRepository {
    async fn insert(&self, resource: &Resource) -> Result<()> {
        let mut resources = lock(&self.resources);
        if resources.iter().any(|r| r.id == resource.id) {
            return Err(Error::AlreadyExists(format!("resource {}", resource.id)));
        }
        resources.push(resource.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Resource>> {
        Ok(lock(&self.resources).iter().find(|r| r.id == id).cloned())
    }

    async fn update(&self, resource: &Resource) -> Result<()> {
        let mut resources = lock(&self.resources);
        let slot = resources
            .iter_mut()
            .find(|r| r.id == resource.id)
            .ok_or_else(|| Error::NotFound(format!("resource {}", resource.id)))?;
        *slot = resource.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut resources = lock(&self.resources);
        let before = resources.len();
        resources.retain(|r| r.id != id);
        Ok(resources.len() < before)
    }

    async fn list_by_origin(&self, origin_file_id: Uuid) -> Result<Vec<Resource>> {
        let mut children: Vec<Resource> = lock(&self.resources)
            .iter()
            .filter(|r| r.origin_file_id == Some(origin_file_id))
            .cloned()
            .collect();
        children.sort_by_key(|r| (r.created_at, r.id));
        Ok(children)
    }

    async fn count_by_stored_path(&self, stored_path: &str) -> Result<i64> {
        Ok(lock(&self.resources)
            .iter()
            .filter(|r| r.stored_path == stored_path)
            .count() as i64)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Resource>> {
        let mut all = lock(&self.resources).clone();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

// =============================================================================
// JOBS
// =============================================================================

/// In-memory [`JobRepository`].
#[derive(Debug, Default)]
pub struct MemoryJobRepository {
    jobs: Mutex<Vec<ProcessingJob>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn modify<F>(&self, id: Uuid, f: F) -> Result<ProcessingJob>
    where
        F: FnOnce(&mut ProcessingJob),
    {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;
        f(job);
        Ok(job.clone())
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn insert(&self, job: &ProcessingJob) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(Error::AlreadyExists(format!("job {}", job.id)));
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ProcessingJob>> {
        Ok(lock(&self.jobs).iter().find(|j| j.id == id).cloned())
    }

    async fn fetch_queued(&self, limit: i64) -> Result<Vec<ProcessingJob>> {
        let mut queued: Vec<ProcessingJob> = lock(&self.jobs)
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .cloned()
            .collect();
        queued.sort_by_key(|j| (j.created_at, j.id));
        queued.truncate(limit.max(0) as usize);
        Ok(queued)
    }

    async fn mark_processing(&self, id: Uuid) -> Result<ProcessingJob> {
        self.modify(id, |job| {
            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
            job.progress_message = None;
        })
    }

    async fn update_progress(&self, id: Uuid, message: &str) -> Result<()> {
        self.modify(id, |job| job.progress_message = Some(message.to_string()))
            .map(|_| ())
    }

    async fn complete(&self, id: Uuid, result_file_id: Uuid) -> Result<ProcessingJob> {
        self.modify(id, |job| {
            job.status = JobStatus::Completed;
            job.result_file_id = Some(result_file_id);
            job.error_message = None;
            job.completed_at = Some(Utc::now());
        })
    }

    async fn fail(
        &self,
        id: Uuid,
        error: &str,
        result_file_id: Option<Uuid>,
    ) -> Result<ProcessingJob> {
        self.modify(id, |job| {
            job.status = JobStatus::Failed;
            job.result_file_id = result_file_id;
            job.error_message = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        })
    }

    async fn requeue(&self, id: Uuid) -> Result<ProcessingJob> {
        self.modify(id, ProcessingJob::requeue)
    }

    async fn list(&self, status: Option<JobStatus>, limit: i64) -> Result<Vec<ProcessingJob>> {
        let mut jobs: Vec<ProcessingJob> = lock(&self.jobs)
            .iter()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        jobs.truncate(limit.max(0) as usize);
        Ok(jobs)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let jobs = lock(&self.jobs);
        let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count() as i64;
        Ok(QueueStats {
            queued: count(JobStatus::Queued),
            processing: count(JobStatus::Processing),
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Failed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxon_core::ResourceType;

    #[tokio::test]
    async fn test_fetch_queued_is_fifo_and_bounded() {
        let repo = MemoryJobRepository::new();
        let mut ids = Vec::new();
        for i in 0..4 {
            let mut job = ProcessingJob::new(Uuid::nil(), format!("/f/{}", i), ResourceType::File);
            job.created_at = Utc::now() + chrono::Duration::seconds(i);
            ids.push(job.id);
            repo.insert(&job).await.unwrap();
        }
        repo.mark_processing(ids[0]).await.unwrap();

        let batch = repo.fetch_queued(2).await.unwrap();
        let got: Vec<_> = batch.iter().map(|j| j.id).collect();
        assert_eq!(got, vec![ids[1], ids[2]]);
    }

    #[tokio::test]
    async fn test_job_transitions_and_stats() {
        let repo = MemoryJobRepository::new();
        let job = ProcessingJob::new(Uuid::nil(), "text-id", ResourceType::Text);
        repo.insert(&job).await.unwrap();

        let running = repo.mark_processing(job.id).await.unwrap();
        assert_eq!(running.status, JobStatus::Processing);
        assert!(running.started_at.is_some());

        let result = Uuid::now_v7();
        let done = repo.complete(job.id, result).await.unwrap();
        assert_eq!(done.result_file_id, Some(result));

        let stats = repo.queue_stats().await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.total(), 1);

        let again = repo.requeue(job.id).await.unwrap();
        assert_eq!(again.status, JobStatus::Queued);
        assert!(again.result_file_id.is_none());
    }

    #[tokio::test]
    async fn test_missing_job_is_not_found() {
        let repo = MemoryJobRepository::new();
        assert!(repo.fail(Uuid::nil(), "x", None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_resource_group_queries() {
        let repo = MemoryResourceRepository::new();
        let root = Resource::new("bundle.pdf", "application/pdf", "2026/01/01/x-bundle.pdf");
        let child = root.child(None);
        let other = Resource::new("other.pdf", "application/pdf", "2026/01/01/y-other.pdf");
        for r in [&root, &child, &other] {
            repo.insert(r).await.unwrap();
        }

        let children = repo.list_by_origin(root.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);
        assert_eq!(repo.count_by_stored_path(&root.stored_path).await.unwrap(), 2);

        assert!(repo.delete(child.id).await.unwrap());
        assert!(!repo.delete(child.id).await.unwrap());
        assert_eq!(repo.count_by_stored_path(&root.stored_path).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concept_crud() {
        let repo = MemoryOntologyRepository::new();
        repo.insert_concept(&Concept::new("A")).await.unwrap();
        repo.insert_concept(&Concept::new("B").inheriting("A"))
            .await
            .unwrap();
        assert!(repo.insert_concept(&Concept::new("A")).await.is_err());
        assert_eq!(repo.count_children("A").await.unwrap(), 1);

        repo.delete_concept("B").await.unwrap();
        assert!(repo.delete_concept("B").await.unwrap_err().is_not_found());
        assert_eq!(repo.list_concepts().await.unwrap().len(), 1);
    }
}
