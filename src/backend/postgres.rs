//! Relational store backed by the managed Postgres database.
//!
//! Queries run with the service connection, so row-level security does not
//! apply; callers are expected to pass ids taken from a verified session.

use super::{Store, StoreError};
use crate::model::{
    NewProfile, NewStudent, NewTeacher, PlayingLevel, Profile, ProfileChanges, Role, Student,
    TeacherChanges, TeacherListing, TeacherRow,
};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    Connection, PgPool, Row,
};
use std::time::Duration;
use tracing::{info_span, Instrument};
use uuid::Uuid;

const PROFILE_COLUMNS: &str = r"
    p.id, p.email, p.first_name, p.last_name, p.role::text AS role, p.phone,
    p.street_address, p.city, p.state, p.zip_code, p.profile_picture_url, p.bio,
    p.created_at, p.updated_at";

const TEACHER_COLUMNS: &str = r"
    t.id AS teacher_id, t.instruments_taught, t.age_groups_taught, t.years_experience,
    t.hourly_rate::float8 AS hourly_rate, t.online_lessons, t.in_person_lessons,
    t.teaching_method, t.introduction, t.is_active, t.verified,
    t.created_at AS teacher_created_at";

const STUDENT_COLUMNS: &str = r"
    id, parent_id, first_name, last_name, email, date_of_birth,
    instruments_of_interest, playing_level::text AS playing_level, learning_goals, time_zone,
    created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a small pool to `dsn`.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn connect(dsn: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

fn map_err(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::UniqueViolation
    } else if matches!(err, sqlx::Error::RowNotFound) {
        StoreError::NotFound
    } else {
        StoreError::Backend(err.to_string())
    }
}

fn profile_from_row(row: &PgRow) -> Result<Profile, StoreError> {
    let role: String = row.try_get("role").map_err(map_err)?;
    let role: Role = role.parse().map_err(StoreError::Backend)?;
    Ok(Profile {
        id: row.try_get("id").map_err(map_err)?,
        email: row.try_get("email").map_err(map_err)?,
        first_name: row.try_get("first_name").map_err(map_err)?,
        last_name: row.try_get("last_name").map_err(map_err)?,
        role,
        phone: row.try_get("phone").map_err(map_err)?,
        street_address: row.try_get("street_address").map_err(map_err)?,
        city: row.try_get("city").map_err(map_err)?,
        state: row.try_get("state").map_err(map_err)?,
        zip_code: row.try_get("zip_code").map_err(map_err)?,
        profile_picture_url: row.try_get("profile_picture_url").map_err(map_err)?,
        bio: row.try_get("bio").map_err(map_err)?,
        created_at: row.try_get("created_at").map_err(map_err)?,
        updated_at: row.try_get("updated_at").map_err(map_err)?,
    })
}

fn teacher_from_row(row: &PgRow) -> Result<TeacherRow, StoreError> {
    Ok(TeacherRow {
        id: row.try_get("teacher_id").map_err(map_err)?,
        instruments_taught: row.try_get("instruments_taught").map_err(map_err)?,
        age_groups_taught: row.try_get("age_groups_taught").map_err(map_err)?,
        years_experience: row.try_get("years_experience").map_err(map_err)?,
        hourly_rate: row.try_get("hourly_rate").map_err(map_err)?,
        online_lessons: row.try_get("online_lessons").map_err(map_err)?,
        in_person_lessons: row.try_get("in_person_lessons").map_err(map_err)?,
        teaching_method: row.try_get("teaching_method").map_err(map_err)?,
        introduction: row.try_get("introduction").map_err(map_err)?,
        is_active: row.try_get("is_active").map_err(map_err)?,
        verified: row.try_get("verified").map_err(map_err)?,
        created_at: row.try_get("teacher_created_at").map_err(map_err)?,
    })
}

fn listing_from_row(row: &PgRow) -> Result<TeacherListing, StoreError> {
    Ok(TeacherListing {
        profile: profile_from_row(row)?,
        teacher: teacher_from_row(row)?,
    })
}

fn student_from_row(row: &PgRow) -> Result<Student, StoreError> {
    let level: String = row.try_get("playing_level").map_err(map_err)?;
    Ok(Student {
        id: row.try_get("id").map_err(map_err)?,
        parent_id: row.try_get("parent_id").map_err(map_err)?,
        first_name: row.try_get("first_name").map_err(map_err)?,
        last_name: row.try_get("last_name").map_err(map_err)?,
        email: row.try_get("email").map_err(map_err)?,
        date_of_birth: row.try_get("date_of_birth").map_err(map_err)?,
        instruments_of_interest: row.try_get("instruments_of_interest").map_err(map_err)?,
        playing_level: PlayingLevel::from_column(&level),
        learning_goals: row.try_get("learning_goals").map_err(map_err)?,
        time_zone: row.try_get("time_zone").map_err(map_err)?,
        created_at: row.try_get("created_at").map_err(map_err)?,
        updated_at: row.try_get("updated_at").map_err(map_err)?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn profile(&self, id: Uuid) -> Result<Option<Profile>, StoreError> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles p WHERE p.id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .map_err(map_err)?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn upsert_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        // The CTE keeps the `p.` column list shared with the plain selects.
        let query = format!(
            r"
            WITH p AS (
                INSERT INTO profiles (id, email, first_name, last_name, role)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE SET
                    email = EXCLUDED.email,
                    first_name = EXCLUDED.first_name,
                    last_name = EXCLUDED.last_name,
                    role = EXCLUDED.role,
                    updated_at = now()
                RETURNING *
            )
            SELECT {PROFILE_COLUMNS} FROM p"
        );
        let row = sqlx::query(&query)
            .bind(profile.id)
            .bind(&profile.email)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(profile.role.as_str())
            .fetch_one(&self.pool)
            .instrument(db_span("UPSERT", &query))
            .await
            .map_err(map_err)?;
        profile_from_row(&row)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Profile, StoreError> {
        let query = format!(
            r"
            WITH p AS (
                UPDATE profiles SET
                    first_name = COALESCE($2, first_name),
                    last_name = COALESCE($3, last_name),
                    phone = COALESCE($4, phone),
                    street_address = COALESCE($5, street_address),
                    city = COALESCE($6, city),
                    state = COALESCE($7, state),
                    zip_code = COALESCE($8, zip_code),
                    profile_picture_url = COALESCE($9, profile_picture_url),
                    bio = COALESCE($10, bio),
                    updated_at = now()
                WHERE id = $1
                RETURNING *
            )
            SELECT {PROFILE_COLUMNS} FROM p"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(&changes.first_name)
            .bind(&changes.last_name)
            .bind(&changes.phone)
            .bind(&changes.street_address)
            .bind(&changes.city)
            .bind(&changes.state)
            .bind(&changes.zip_code)
            .bind(&changes.profile_picture_url)
            .bind(&changes.bio)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .map_err(map_err)?;
        row.as_ref()
            .map(profile_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn insert_teacher(&self, teacher: &NewTeacher) -> Result<TeacherRow, StoreError> {
        let query = format!(
            r"
            WITH t AS (
                INSERT INTO teachers (id, is_active, verified)
                VALUES ($1, $2, $3)
                RETURNING *
            )
            SELECT {TEACHER_COLUMNS} FROM t"
        );
        let row = sqlx::query(&query)
            .bind(teacher.id)
            .bind(teacher.is_active)
            .bind(teacher.verified)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await
            .map_err(map_err)?;
        teacher_from_row(&row)
    }

    async fn teacher(&self, id: Uuid) -> Result<Option<TeacherRow>, StoreError> {
        let query = format!("SELECT {TEACHER_COLUMNS} FROM teachers t WHERE t.id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .map_err(map_err)?;
        row.as_ref().map(teacher_from_row).transpose()
    }

    async fn update_teacher(
        &self,
        id: Uuid,
        changes: &TeacherChanges,
    ) -> Result<TeacherRow, StoreError> {
        let query = format!(
            r"
            WITH t AS (
                UPDATE teachers SET
                    instruments_taught = COALESCE($2, instruments_taught),
                    age_groups_taught = COALESCE($3, age_groups_taught),
                    years_experience = COALESCE($4, years_experience),
                    hourly_rate = COALESCE($5::float8::numeric, hourly_rate),
                    online_lessons = COALESCE($6, online_lessons),
                    in_person_lessons = COALESCE($7, in_person_lessons),
                    teaching_method = COALESCE($8, teaching_method),
                    introduction = COALESCE($9, introduction),
                    is_active = COALESCE($10, is_active),
                    verified = COALESCE($11, verified)
                WHERE id = $1
                RETURNING *
            )
            SELECT {TEACHER_COLUMNS} FROM t"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(&changes.instruments_taught)
            .bind(&changes.age_groups_taught)
            .bind(changes.years_experience)
            .bind(changes.hourly_rate)
            .bind(changes.online_lessons)
            .bind(changes.in_person_lessons)
            .bind(&changes.teaching_method)
            .bind(&changes.introduction)
            .bind(changes.is_active)
            .bind(changes.verified)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .map_err(map_err)?;
        row.as_ref()
            .map(teacher_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn active_teachers(&self) -> Result<Vec<TeacherListing>, StoreError> {
        let query = format!(
            r"
            SELECT {PROFILE_COLUMNS}, {TEACHER_COLUMNS}
            FROM profiles p
            JOIN teachers t ON t.id = p.id
            WHERE p.role = 'teacher' AND t.is_active
            ORDER BY p.last_name, p.first_name"
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .map_err(map_err)?;
        rows.iter().map(listing_from_row).collect()
    }

    async fn teacher_listing(&self, id: Uuid) -> Result<Option<TeacherListing>, StoreError> {
        let query = format!(
            r"
            SELECT {PROFILE_COLUMNS}, {TEACHER_COLUMNS}
            FROM profiles p
            JOIN teachers t ON t.id = p.id
            WHERE p.id = $1"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .map_err(map_err)?;
        row.as_ref().map(listing_from_row).transpose()
    }

    async fn students_for_parent(&self, parent_id: Uuid) -> Result<Vec<Student>, StoreError> {
        let query = format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE parent_id = $1 ORDER BY created_at"
        );
        let rows = sqlx::query(&query)
            .bind(parent_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await
            .map_err(map_err)?;
        rows.iter().map(student_from_row).collect()
    }

    async fn insert_student(&self, student: &NewStudent) -> Result<Student, StoreError> {
        let query = format!(
            r"
            INSERT INTO students
                (parent_id, first_name, last_name, email, date_of_birth,
                 instruments_of_interest, playing_level, learning_goals, time_zone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {STUDENT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(student.parent_id)
            .bind(&student.first_name)
            .bind(&student.last_name)
            .bind(&student.email)
            .bind(student.date_of_birth)
            .bind(&student.instruments_of_interest)
            .bind(student.playing_level.as_str())
            .bind(&student.learning_goals)
            .bind(&student.time_zone)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await
            .map_err(map_err)?;
        student_from_row(&row)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .map_err(map_err)?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await.map_err(map_err)
    }
}
