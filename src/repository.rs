use crate::models::{
    Analytics, Material, MaterialSummary, NewMaterial, NewSubject, NewUser, Subject,
    SubjectSummary, User,
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

mod memory;

pub use memory::InMemoryRepository;

/// RepositoryError
///
/// Store-level failures. Handlers translate `Duplicate` into a resource-specific
/// "already exists" message; everything else becomes a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A unique column (named by the payload) already holds the value.
    #[error("duplicate value for unique field `{0}`")]
    Duplicate(&'static str),

    /// The row references a parent (named by the payload) that does not exist.
    #[error("referenced {0} does not exist")]
    MissingReference(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository Trait
///
/// The persistence contract for users, subjects and materials. Handlers only
/// ever see `Arc<dyn Repository>`, so Postgres and the in-memory store are
/// interchangeable.
///
/// **Send + Sync + async_trait** are required to make the trait object
/// shareable across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    // Newest first.
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;
    async fn admin_exists(&self) -> Result<bool, RepositoryError>;
    // Returns false when no such user exists.
    async fn verify_user(&self, id: Uuid) -> Result<bool, RepositoryError>;
    // Never removes an admin, even if asked to; returns whether a row was deleted.
    async fn delete_user(&self, id: Uuid) -> Result<bool, RepositoryError>;

    // --- Subjects ---
    async fn list_subjects(&self) -> Result<Vec<SubjectSummary>, RepositoryError>;
    async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>, RepositoryError>;
    async fn create_subject(&self, subject: NewSubject) -> Result<Subject, RepositoryError>;
    /// Removes the subject and every material that references it, atomically.
    /// `None` if the subject does not exist, otherwise the number of materials removed.
    async fn delete_subject(&self, id: Uuid) -> Result<Option<u64>, RepositoryError>;

    // --- Materials ---
    // Newest first.
    async fn list_materials(&self, subject_id: Uuid) -> Result<Vec<MaterialSummary>, RepositoryError>;
    /// Plain lookup with no side effects. No endpoint reads a single material
    /// (downloads go through `record_download`); tests use it to inspect state.
    async fn get_material(&self, id: Uuid) -> Result<Option<Material>, RepositoryError>;
    /// Fails with `MissingReference("subject")` when the subject is gone.
    async fn create_material(&self, material: NewMaterial) -> Result<Material, RepositoryError>;
    /// Atomically bumps the download counter and returns the updated record.
    async fn record_download(&self, id: Uuid) -> Result<Option<Material>, RepositoryError>;

    // --- Dashboard ---
    async fn get_analytics(&self) -> Result<Analytics, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, name, email, password_hash, role, is_verified, created_at";
const SUBJECT_COLUMNS: &str = "id, name, description, created_by, created_at";
const MATERIAL_COLUMNS: &str =
    "id, title, description, subject_id, file_url, file_name, file_size, uploaded_by, downloads, created_at";

/// Maps a unique-index violation onto `RepositoryError::Duplicate(field)`.
fn unique_violation(err: sqlx::Error, field: &'static str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::Duplicate(field)
        }
        _ => RepositoryError::Database(err),
    }
}

/// Maps a violation of the named foreign key onto
/// `RepositoryError::MissingReference(entity)`.
fn foreign_key_violation(
    err: sqlx::Error,
    constraint: &str,
    entity: &'static str,
) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err)
            if db_err.is_foreign_key_violation() && db_err.constraint() == Some(constraint) =>
        {
            RepositoryError::MissingReference(entity)
        }
        _ => RepositoryError::Database(err),
    }
}

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Queries are built at
/// runtime (`query_as::<_, T>`) so the crate compiles without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the SQL migrations under `migrations/`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let query = format!(
            "INSERT INTO users (id, name, email, password_hash, role, is_verified, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.is_verified)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| unique_violation(e, "email"))
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        Ok(sqlx::query_as::<_, User>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn admin_exists(&self) -> Result<bool, RepositoryError> {
        Ok(
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE role = 'admin')")
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn verify_user(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE users SET is_verified = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The `role <> 'admin'` predicate backs up the handler's permission check.
    async fn delete_user(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND role <> 'admin'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// list_subjects
    ///
    /// Subjects in creation order, each with its creator's display name.
    async fn list_subjects(&self) -> Result<Vec<SubjectSummary>, RepositoryError> {
        Ok(sqlx::query_as::<_, SubjectSummary>(
            r#"
            SELECT s.id, s.name, s.description, s.created_by, u.name AS creator_name, s.created_at
            FROM subjects s
            LEFT JOIN users u ON u.id = s.created_by
            ORDER BY s.created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>, RepositoryError> {
        let query = format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE id = $1");
        Ok(sqlx::query_as::<_, Subject>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_subject(&self, subject: NewSubject) -> Result<Subject, RepositoryError> {
        let query = format!(
            "INSERT INTO subjects (id, name, description, created_by, created_at) \
             VALUES ($1, $2, $3, $4, NOW()) RETURNING {SUBJECT_COLUMNS}"
        );

        sqlx::query_as::<_, Subject>(&query)
            .bind(Uuid::new_v4())
            .bind(&subject.name)
            .bind(&subject.description)
            .bind(subject.created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| unique_violation(e, "name"))
    }

    /// delete_subject
    ///
    /// The store has no cascading foreign keys, so the cascade happens here in
    /// one transaction. The subject row is locked first; a concurrent material
    /// insert against it blocks on the foreign key and then fails.
    async fn delete_subject(&self, id: Uuid) -> Result<Option<u64>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM subjects WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        if locked.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let removed = sqlx::query("DELETE FROM materials WHERE subject_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM subjects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(removed))
    }

    async fn list_materials(&self, subject_id: Uuid) -> Result<Vec<MaterialSummary>, RepositoryError> {
        Ok(sqlx::query_as::<_, MaterialSummary>(
            r#"
            SELECT m.id, m.title, m.description, m.subject_id, m.file_url, m.file_name,
                   m.file_size, m.uploaded_by, u.name AS uploader_name, m.downloads, m.created_at
            FROM materials m
            LEFT JOIN users u ON u.id = m.uploaded_by
            WHERE m.subject_id = $1
            ORDER BY m.created_at DESC
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_material(&self, id: Uuid) -> Result<Option<Material>, RepositoryError> {
        let query = format!("SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1");
        Ok(sqlx::query_as::<_, Material>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_material(&self, material: NewMaterial) -> Result<Material, RepositoryError> {
        let query = format!(
            "INSERT INTO materials \
             (id, title, description, subject_id, file_url, file_name, file_size, uploaded_by, downloads, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, NOW()) RETURNING {MATERIAL_COLUMNS}"
        );

        sqlx::query_as::<_, Material>(&query)
            .bind(Uuid::new_v4())
            .bind(&material.title)
            .bind(&material.description)
            .bind(material.subject_id)
            .bind(&material.file_url)
            .bind(&material.file_name)
            .bind(material.file_size)
            .bind(material.uploaded_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| foreign_key_violation(e, "materials_subject_id_fkey", "subject"))
    }

    /// record_download
    ///
    /// A single-statement increment, so concurrent requests never lose a count.
    async fn record_download(&self, id: Uuid) -> Result<Option<Material>, RepositoryError> {
        let query = format!(
            "UPDATE materials SET downloads = downloads + 1 WHERE id = $1 RETURNING {MATERIAL_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Material>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// get_analytics
    ///
    /// Compiles all dashboard counters in a single round trip.
    async fn get_analytics(&self) -> Result<Analytics, RepositoryError> {
        Ok(sqlx::query_as::<_, Analytics>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COUNT(*) FROM users WHERE is_verified) AS verified_users,
                (SELECT COUNT(*) FROM subjects) AS total_subjects,
                (SELECT COUNT(*) FROM materials) AS total_materials,
                (SELECT COALESCE(SUM(downloads), 0)::BIGINT FROM materials) AS total_downloads
            "#,
        )
        .fetch_one(&self.pool)
        .await?)
    }
}
