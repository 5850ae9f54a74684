use std::sync::Arc;

use course_core::model::{Course, CourseDraft, CourseId};
use storage::repository::{CourseRepository, ProgressRepository, StorageError};

use crate::Clock;
use crate::error::CatalogError;

/// Public course catalog and admin course management.
#[derive(Clone)]
pub struct CatalogService {
    clock: Clock,
    courses: Arc<dyn CourseRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(
        clock: Clock,
        courses: Arc<dyn CourseRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            courses,
            progress,
        }
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if repository access fails.
    pub async fn list_published(&self) -> Result<Vec<Course>, CatalogError> {
        Ok(self.courses.list_courses(true).await?)
    }

    /// Fetch a course visible to the public.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for missing or unpublished courses.
    pub async fn get_published(&self, id: CourseId) -> Result<Course, CatalogError> {
        self.courses
            .get_course(id)
            .await?
            .filter(Course::is_published)
            .ok_or(CatalogError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if repository access fails.
    pub async fn list_all(&self) -> Result<Vec<Course>, CatalogError> {
        Ok(self.courses.list_courses(false).await?)
    }

    /// Fetch any course, published or not.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the course does not exist.
    pub async fn get(&self, id: CourseId) -> Result<Course, CatalogError> {
        self.courses
            .get_course(id)
            .await?
            .ok_or(CatalogError::NotFound)
    }

    /// Validate and store a new course.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Course` for invalid drafts.
    pub async fn create(&self, draft: CourseDraft) -> Result<Course, CatalogError> {
        let course = Course::new(CourseId::new(0), draft, self.clock.now())?;
        let id = self.courses.insert_course(&course).await?;
        tracing::info!(course = %id, title = course.title(), "course created");
        Ok(course.with_id(id))
    }

    /// Replace a course's content. Chapter and quiz ids present in the draft
    /// are kept; missing ones are assigned after the highest existing id.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for unknown courses and
    /// `CatalogError::Course` for invalid drafts.
    pub async fn update(&self, id: CourseId, draft: CourseDraft) -> Result<Course, CatalogError> {
        let current = self.get(id).await?;
        let revised = current.revise(draft, self.clock.now())?;
        self.courses.upsert_course(&revised).await?;
        tracing::info!(course = %id, "course updated");
        Ok(revised)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the course does not exist.
    pub async fn set_published(
        &self,
        id: CourseId,
        published: bool,
    ) -> Result<Course, CatalogError> {
        let mut course = self.get(id).await?;
        course.set_published(published, self.clock.now());
        self.courses.upsert_course(&course).await?;
        tracing::info!(course = %id, published, "course visibility changed");
        Ok(course)
    }

    /// Delete a course together with every learner's progress on it.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the course does not exist.
    pub async fn delete(&self, id: CourseId) -> Result<(), CatalogError> {
        self.get(id).await?;
        let removed = self.progress.delete_progress_for_course(id).await?;
        match self.courses.delete_course(id).await {
            Ok(()) => {}
            Err(StorageError::NotFound) => return Err(CatalogError::NotFound),
            Err(e) => return Err(e.into()),
        }
        tracing::info!(course = %id, progress_removed = removed, "course deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use course_core::model::{ChapterDraft, Progress, UserId};
    use course_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    fn draft(title: &str, published: bool) -> CourseDraft {
        CourseDraft {
            title: title.into(),
            published,
            chapters: vec![ChapterDraft {
                title: "One".into(),
                ..ChapterDraft::default()
            }],
            ..CourseDraft::default()
        }
    }

    fn service(repo: &InMemoryRepository) -> CatalogService {
        CatalogService::new(fixed_clock(), Arc::new(repo.clone()), Arc::new(repo.clone()))
    }

    #[tokio::test]
    async fn unpublished_courses_are_hidden() {
        let repo = InMemoryRepository::new();
        let catalog = service(&repo);
        let hidden = catalog.create(draft("Hidden", false)).await.unwrap();
        let shown = catalog.create(draft("Shown", true)).await.unwrap();

        let listed = catalog.list_published().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), shown.id());
        assert!(matches!(
            catalog.get_published(hidden.id()).await,
            Err(CatalogError::NotFound)
        ));
        assert_eq!(catalog.list_all().await.unwrap().len(), 2);

        catalog.set_published(hidden.id(), true).await.unwrap();
        assert!(catalog.get_published(hidden.id()).await.is_ok());
    }

    #[tokio::test]
    async fn update_keeps_existing_chapter_ids() {
        let repo = InMemoryRepository::new();
        let catalog = service(&repo);
        let course = catalog.create(draft("Rust", true)).await.unwrap();

        let mut edit = course.to_draft();
        edit.chapters.insert(
            0,
            ChapterDraft {
                title: "Prologue".into(),
                ..ChapterDraft::default()
            },
        );
        let updated = catalog.update(course.id(), edit).await.unwrap();
        let ids: Vec<u64> = updated.chapters().iter().map(|c| c.id.value()).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn delete_removes_progress() {
        let repo = InMemoryRepository::new();
        let catalog = service(&repo);
        let course = catalog.create(draft("Rust", true)).await.unwrap();
        repo.upsert_progress(&Progress::new(UserId::new(1), course.id(), fixed_now()))
            .await
            .unwrap();

        catalog.delete(course.id()).await.unwrap();
        assert!(
            repo.get_progress(UserId::new(1), course.id())
                .await
                .unwrap()
                .is_none()
        );
        assert!(matches!(
            catalog.delete(course.id()).await,
            Err(CatalogError::NotFound)
        ));
    }
}
