use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::repository::{Filter, Repositories};
use crate::dtos::CreateStudentRequest;
use crate::middleware::Actor;
use crate::models::Student;

#[derive(Clone)]
pub struct StudentService {
    repos: Repositories,
}

impl StudentService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    #[instrument(skip(self, actor, request), fields(name = %request.name))]
    pub async fn create(
        &self,
        actor: &Actor,
        request: CreateStudentRequest,
    ) -> Result<Student, AppError> {
        actor.require_admin()?;
        request.validate()?;

        let student = Student::new(request.name, request.representative_id);
        self.repos.students.insert(&student).await?;

        tracing::info!(student_id = %student.id, "Student created");
        Ok(student)
    }

    pub async fn get(&self, id: Uuid) -> Result<Student, AppError> {
        self.repos
            .students
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Student", id))
    }

    /// Active students. Representatives only see their own.
    pub async fn list(&self, actor: &Actor) -> Result<Vec<Student>, AppError> {
        let filter = if actor.is_admin() {
            Filter::new()
        } else {
            Filter::new().text("representative_id", actor.user_id.as_str())
        };
        self.repos.students.find(filter).await
    }

    /// Ids of the students a representative answers for.
    pub(crate) async fn represented_by(&self, user_id: &str) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .repos
            .students
            .find(Filter::new().text("representative_id", user_id))
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect())
    }

    #[instrument(skip(self, actor))]
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), AppError> {
        actor.require_admin()?;
        if !self.repos.students.soft_delete(id).await? {
            return Err(AppError::not_found("Student", id));
        }
        tracing::info!(student_id = %id, "Student deleted");
        Ok(())
    }
}
