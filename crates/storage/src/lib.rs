use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError, sqlite::SqlitePoolOptions, Row, Sqlite, SqlitePool, Transaction,
};
use thiserror::Error;

use jobtrack_core::types::{Company, JobApplication, JobStatus, SortOrder};

/// SQLite unique-constraint violation (SQLITE_CONSTRAINT_UNIQUE).
const SQLITE_UNIQUE_VIOLATION: &str = "2067";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for interacting with user accounts.
    pub fn users(&self) -> UserRepository {
        UserRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for interacting with companies.
    pub fn companies(&self) -> CompanyRepository {
        CompanyRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle to operate on job applications.
    pub fn jobs(&self) -> JobRepository {
        JobRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository handling user accounts.
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Inserts a new account and returns its generated id.
    ///
    /// A unique-index violation on the email column is surfaced as
    /// [`UserError::DuplicateEmail`] so callers can map it to a conflict.
    pub async fn insert(&self, user: NewUser<'_>) -> Result<i64, UserError> {
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, role, created_at) \
             VALUES (?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.role)
        .bind(to_rfc3339(user.created_at))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.get("id")),
            Err(sqlx::Error::Database(db_err)) => {
                if db_err.code().as_deref() == Some(SQLITE_UNIQUE_VIOLATION) {
                    Err(UserError::DuplicateEmail)
                } else {
                    Err(UserError::Database(sqlx::Error::Database(db_err)))
                }
            }
            Err(err) => Err(UserError::Database(err)),
        }
    }

    /// Looks up an account by email, used by the login path.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, UserError> {
        let row = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, password_hash, role, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Looks up an account by primary key.
    pub async fn find_by_id(&self, user_id: i64) -> Result<Option<UserRecord>, UserError> {
        let row = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, password_hash, role, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

/// Data required to create a user account.
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub created_at: DateTime<Utc>,
}

/// Persisted user row. The password hash never leaves the HTTP boundary.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Errors that can occur while operating on user accounts.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("an account with this email already exists")]
    DuplicateEmail,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository handling companies.
#[derive(Clone)]
pub struct CompanyRepository {
    pool: SqlitePool,
}

impl CompanyRepository {
    /// Inserts a new company owned by the creating user.
    pub async fn insert(&self, company: NewCompany<'_>) -> Result<Company, CompanyError> {
        let row = sqlx::query(
            "INSERT INTO companies (name, location, website, created_at, user_id) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(company.name)
        .bind(company.location)
        .bind(company.website)
        .bind(to_rfc3339(company.created_at))
        .bind(company.user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Company {
            id: row.get("id"),
            name: company.name.to_string(),
            location: company.location.map(str::to_string),
            website: company.website.map(str::to_string),
            created_at: company.created_at,
            user_id: company.user_id,
        })
    }

    /// Resolves a company by primary key AND owner in one filtered lookup.
    ///
    /// A company owned by a different user is indistinguishable from a
    /// missing one: both return `None`. Existence must not leak through
    /// ownership failures.
    pub async fn find_owned(
        &self,
        user_id: i64,
        company_id: i64,
    ) -> Result<Option<Company>, CompanyError> {
        let row = sqlx::query_as::<_, CompanyRow>(
            "SELECT id, name, location, website, created_at, user_id \
             FROM companies WHERE id = ? AND user_id = ?",
        )
        .bind(company_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CompanyRow::into_domain))
    }

    /// Lists every company owned by the user. No pagination; ordering is
    /// whatever the store returns.
    pub async fn list_for_owner(&self, user_id: i64) -> Result<Vec<Company>, CompanyError> {
        let rows = sqlx::query_as::<_, CompanyRow>(
            "SELECT id, name, location, website, created_at, user_id \
             FROM companies WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CompanyRow::into_domain).collect())
    }
}

/// Data required to create a company.
pub struct NewCompany<'a> {
    pub name: &'a str,
    pub location: Option<&'a str>,
    pub website: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub user_id: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CompanyRow {
    id: i64,
    name: String,
    location: Option<String>,
    website: Option<String>,
    created_at: DateTime<Utc>,
    user_id: i64,
}

impl CompanyRow {
    fn into_domain(self) -> Company {
        Company {
            id: self.id,
            name: self.name,
            location: self.location,
            website: self.website,
            created_at: self.created_at,
            user_id: self.user_id,
        }
    }
}

/// Errors that can occur while operating on companies.
#[derive(Debug, Error)]
pub enum CompanyError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for job applications.
#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    /// Begins a SQLite transaction for a guard-then-mutate sequence.
    pub async fn begin(&self) -> Result<Transaction<'_, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Inserts a new job application.
    ///
    /// The status column is always the initial state; callers cannot select
    /// it, so any client-supplied value never reaches this query.
    pub async fn insert(&self, job: NewJobApplication<'_>) -> Result<JobApplication, JobError> {
        let row = sqlx::query(
            "INSERT INTO job_applications (title, status, applied_at, company_id, user_id) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(job.title)
        .bind(JobStatus::Applied.as_str())
        .bind(to_rfc3339(job.applied_at))
        .bind(job.company_id)
        .bind(job.user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(JobApplication {
            id: row.get("id"),
            title: job.title.to_string(),
            status: JobStatus::Applied,
            applied_at: job.applied_at,
            company_id: job.company_id,
            user_id: job.user_id,
        })
    }

    /// Resolves a job by primary key AND owner inside a transaction, so the
    /// transition check and the update read the same persisted row.
    ///
    /// Same information-hiding contract as
    /// [`CompanyRepository::find_owned`]: not-owned reads as missing.
    pub async fn find_owned(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user_id: i64,
        job_id: i64,
    ) -> Result<Option<JobApplication>, JobError> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT id, title, status, applied_at, company_id, user_id \
             FROM job_applications WHERE id = ? AND user_id = ?",
        )
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(JobRow::into_domain))
    }

    /// Overwrites the status of a job. No history of prior statuses is kept.
    pub async fn set_status(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        job_id: i64,
        status: JobStatus,
    ) -> Result<(), JobError> {
        sqlx::query("UPDATE job_applications SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(job_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Lists jobs owned by the user with the parent company eagerly joined.
    ///
    /// The status filter is exact-match against the stored column: a value
    /// outside the status set simply matches nothing. Ordering is on the
    /// applied timestamp with the id as a deterministic tie-break.
    pub async fn list_with_company(
        &self,
        user_id: i64,
        query: &JobQuery<'_>,
    ) -> Result<Vec<(JobApplication, String)>, JobError> {
        let dir = query.sort.sql();
        let filter = if query.status.is_some() {
            " AND j.status = ?"
        } else {
            ""
        };
        let sql = format!(
            "SELECT j.id, j.title, j.status, j.applied_at, j.company_id, j.user_id, \
                    c.name AS company_name \
             FROM job_applications AS j \
             JOIN companies AS c ON c.id = j.company_id \
             WHERE j.user_id = ?{filter} \
             ORDER BY j.applied_at {dir}, j.id {dir} \
             LIMIT ? OFFSET ?",
        );

        let mut q = sqlx::query_as::<_, JobWithCompanyRow>(&sql).bind(user_id);
        if let Some(status) = query.status {
            q = q.bind(status);
        }
        let rows = q
            .bind(query.limit.max(0))
            .bind(query.offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(JobWithCompanyRow::into_domain).collect())
    }
}

/// Data required to create a job application.
pub struct NewJobApplication<'a> {
    pub title: &'a str,
    pub applied_at: DateTime<Utc>,
    pub company_id: i64,
    pub user_id: i64,
}

/// Listing parameters applied after the owner scope.
pub struct JobQuery<'a> {
    pub status: Option<&'a str>,
    pub limit: i64,
    pub offset: i64,
    pub sort: SortOrder,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    title: String,
    status: String,
    applied_at: DateTime<Utc>,
    company_id: i64,
    user_id: i64,
}

impl JobRow {
    fn into_domain(self) -> JobApplication {
        JobApplication {
            id: self.id,
            title: self.title,
            status: parse_status(&self.status),
            applied_at: self.applied_at,
            company_id: self.company_id,
            user_id: self.user_id,
        }
    }
}

/// Job row joined with its parent company's name.
#[derive(Debug, sqlx::FromRow)]
struct JobWithCompanyRow {
    id: i64,
    title: String,
    status: String,
    applied_at: DateTime<Utc>,
    company_id: i64,
    user_id: i64,
    company_name: String,
}

impl JobWithCompanyRow {
    fn into_domain(self) -> (JobApplication, String) {
        (
            JobApplication {
                id: self.id,
                title: self.title,
                status: parse_status(&self.status),
                applied_at: self.applied_at,
                company_id: self.company_id,
                user_id: self.user_id,
            },
            self.company_name,
        )
    }
}

fn parse_status(value: &str) -> JobStatus {
    value.parse().unwrap_or(JobStatus::Applied)
}

/// Errors that can occur while operating on job applications.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
