use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{Repository, RepositoryError};
use crate::models::{
    Analytics, Material, MaterialSummary, NewMaterial, NewSubject, NewUser, Role, Subject,
    SubjectSummary, User,
};

#[derive(Default)]
struct Tables {
    // Insertion order doubles as creation order.
    users: Vec<User>,
    subjects: Vec<Subject>,
    materials: Vec<Material>,
}

/// InMemoryRepository
///
/// A `Repository` held entirely in process memory, used by the test suites and
/// for running the API without Postgres. It enforces the same unique fields
/// (user email, subject name) and performs the subject cascade under one lock,
/// so it has no inconsistency window at all.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn user_name(tables: &Tables, id: Uuid) -> Option<String> {
    tables
        .users
        .iter()
        .find(|u| u.id == id)
        .map(|u| u.name.clone())
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables();
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(RepositoryError::Duplicate("email"));
        }

        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_verified: user.is_verified,
            created_at: Utc::now(),
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables().users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables().users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.tables().users.iter().rev().cloned().collect())
    }

    async fn admin_exists(&self) -> Result<bool, RepositoryError> {
        Ok(self.tables().users.iter().any(|u| u.role == Role::Admin))
    }

    async fn verify_user(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut tables = self.tables();
        match tables.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.is_verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut tables = self.tables();
        let before = tables.users.len();
        tables
            .users
            .retain(|u| u.id != id || u.role == Role::Admin);
        Ok(tables.users.len() < before)
    }

    async fn list_subjects(&self) -> Result<Vec<SubjectSummary>, RepositoryError> {
        let tables = self.tables();
        Ok(tables
            .subjects
            .iter()
            .map(|s| SubjectSummary {
                id: s.id,
                name: s.name.clone(),
                description: s.description.clone(),
                created_by: s.created_by,
                creator_name: user_name(&tables, s.created_by),
                created_at: s.created_at,
            })
            .collect())
    }

    async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>, RepositoryError> {
        Ok(self.tables().subjects.iter().find(|s| s.id == id).cloned())
    }

    async fn create_subject(&self, subject: NewSubject) -> Result<Subject, RepositoryError> {
        let mut tables = self.tables();
        if tables.subjects.iter().any(|s| s.name == subject.name) {
            return Err(RepositoryError::Duplicate("name"));
        }

        let created = Subject {
            id: Uuid::new_v4(),
            name: subject.name,
            description: subject.description,
            created_by: subject.created_by,
            created_at: Utc::now(),
        };
        tables.subjects.push(created.clone());
        Ok(created)
    }

    async fn delete_subject(&self, id: Uuid) -> Result<Option<u64>, RepositoryError> {
        let mut tables = self.tables();
        if !tables.subjects.iter().any(|s| s.id == id) {
            return Ok(None);
        }

        let before = tables.materials.len();
        tables.materials.retain(|m| m.subject_id != id);
        let removed = (before - tables.materials.len()) as u64;
        tables.subjects.retain(|s| s.id != id);
        Ok(Some(removed))
    }

    async fn list_materials(&self, subject_id: Uuid) -> Result<Vec<MaterialSummary>, RepositoryError> {
        let tables = self.tables();
        Ok(tables
            .materials
            .iter()
            .rev()
            .filter(|m| m.subject_id == subject_id)
            .map(|m| MaterialSummary {
                id: m.id,
                title: m.title.clone(),
                description: m.description.clone(),
                subject_id: m.subject_id,
                file_url: m.file_url.clone(),
                file_name: m.file_name.clone(),
                file_size: m.file_size,
                uploaded_by: m.uploaded_by,
                uploader_name: user_name(&tables, m.uploaded_by),
                downloads: m.downloads,
                created_at: m.created_at,
            })
            .collect())
    }

    async fn get_material(&self, id: Uuid) -> Result<Option<Material>, RepositoryError> {
        Ok(self.tables().materials.iter().find(|m| m.id == id).cloned())
    }

    async fn create_material(&self, material: NewMaterial) -> Result<Material, RepositoryError> {
        let mut tables = self.tables();
        if !tables.subjects.iter().any(|s| s.id == material.subject_id) {
            return Err(RepositoryError::MissingReference("subject"));
        }

        let created = Material {
            id: Uuid::new_v4(),
            title: material.title,
            description: material.description,
            subject_id: material.subject_id,
            file_url: material.file_url,
            file_name: material.file_name,
            file_size: material.file_size,
            uploaded_by: material.uploaded_by,
            downloads: 0,
            created_at: Utc::now(),
        };
        tables.materials.push(created.clone());
        Ok(created)
    }

    async fn record_download(&self, id: Uuid) -> Result<Option<Material>, RepositoryError> {
        let mut tables = self.tables();
        Ok(tables.materials.iter_mut().find(|m| m.id == id).map(|m| {
            m.downloads += 1;
            m.clone()
        }))
    }

    async fn get_analytics(&self) -> Result<Analytics, RepositoryError> {
        let tables = self.tables();
        Ok(Analytics {
            total_users: tables.users.len() as i64,
            verified_users: tables.users.iter().filter(|u| u.is_verified).count() as i64,
            total_subjects: tables.subjects.len() as i64,
            total_materials: tables.materials.len() as i64,
            total_downloads: tables.materials.iter().map(|m| m.downloads).sum(),
        })
    }
}
