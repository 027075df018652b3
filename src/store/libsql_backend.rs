//! libSQL backend — async implementation of the storage traits.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and safe
//! for concurrent async use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StorageError;
use crate::onboarding::model::{Industry, Partner, Role, UserOnboardingProfile};
use crate::store::migrations;
use crate::store::traits::{
    CasOutcome, IndustryCatalog, PartnerCatalog, ProfileChanges, ProfileStore, RoleStore,
};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StorageError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| StorageError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Insert an industry into the catalog, returning the stored row.
    /// Idempotent on name.
    pub async fn insert_industry(&self, name: &str) -> Result<Industry, StorageError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO industries (id, name) VALUES (?1, ?2)",
                params![Uuid::new_v4().to_string(), name.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("insert_industry: {e}")))?;

        self.find_by_name(name)
            .await?
            .ok_or_else(|| StorageError::Query(format!("industry {name} missing after insert")))
    }

    /// Insert a communication partner into the catalog, returning the stored
    /// row. Idempotent on name.
    pub async fn insert_partner(&self, name: &str, active: bool) -> Result<Partner, StorageError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO partners (id, name, active) VALUES (?1, ?2, ?3)",
                params![
                    Uuid::new_v4().to_string(),
                    name.to_string(),
                    active as i64
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("insert_partner: {e}")))?;

        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, active FROM partners WHERE name = ?1",
                params![name.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("insert_partner lookup: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StorageError::Query(format!("insert_partner lookup: {e}")))?
        {
            Some(row) => row_to_partner(&row)
                .map_err(|e| StorageError::Query(format!("insert_partner row parse: {e}"))),
            None => Err(StorageError::Query(format!(
                "partner {name} missing after insert"
            ))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// An optional text parameter — NULL when absent.
fn opt_text(value: Option<String>) -> libsql::Value {
    match value {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

const PROFILE_COLUMNS: &str = "user_id, native_language, industry_id, selected_role_id, \
     partners, completed_at, version, created_at, updated_at";

/// Map a libsql Row to a UserOnboardingProfile. Column order matches
/// PROFILE_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<UserOnboardingProfile, libsql::Error> {
    let user_id: String = row.get(0)?;
    let language_str: Option<String> = row.get::<String>(1).ok();
    let industry_str: Option<String> = row.get::<String>(2).ok();
    let role_str: Option<String> = row.get::<String>(3).ok();
    let partners_str: String = row.get(4)?;
    let completed_str: Option<String> = row.get::<String>(5).ok();
    let version: i64 = row.get(6)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    Ok(UserOnboardingProfile {
        user_id,
        native_language: language_str.and_then(|s| s.parse().ok()),
        industry_id: industry_str.map(|s| parse_uuid(&s)),
        selected_role_id: role_str.map(|s| parse_uuid(&s)),
        partners: serde_json::from_str(&partners_str).unwrap_or_default(),
        completed_at: completed_str.map(|s| parse_datetime(&s)),
        version,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const ROLE_COLUMNS: &str = "id, title, description, industry_id, embedding, created_by, created_at";

/// Map a libsql Row to a Role. Column order matches ROLE_COLUMNS.
fn row_to_role(row: &libsql::Row) -> Result<Role, libsql::Error> {
    let id_str: String = row.get(0)?;
    let title: String = row.get(1)?;
    let description: String = row.get(2)?;
    let industry_str: String = row.get(3)?;
    let embedding_str: Option<String> = row.get::<String>(4).ok();
    let created_by: Option<String> = row.get::<String>(5).ok();
    let created_str: String = row.get(6)?;

    Ok(Role {
        id: parse_uuid(&id_str),
        title,
        description,
        industry_id: parse_uuid(&industry_str),
        embedding: embedding_str.and_then(|s| serde_json::from_str(&s).ok()),
        created_by,
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_partner(row: &libsql::Row) -> Result<Partner, libsql::Error> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    let active: i64 = row.get(2)?;
    Ok(Partner {
        id: parse_uuid(&id_str),
        name,
        active: active != 0,
    })
}

fn row_to_industry(row: &libsql::Row) -> Result<Industry, libsql::Error> {
    let id_str: String = row.get(0)?;
    let name: String = row.get(1)?;
    Ok(Industry {
        id: parse_uuid(&id_str),
        name,
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn get_profile(
        &self,
        user_id: &str,
    ) -> Result<Option<UserOnboardingProfile>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let profile = row_to_profile(&row)
                    .map_err(|e| StorageError::Query(format!("get_profile row parse: {e}")))?;
                Ok(Some(profile))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn create_profile(&self, user_id: &str) -> Result<UserOnboardingProfile, StorageError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO profiles (user_id, partners, version, created_at, updated_at)
                 VALUES (?1, '[]', 0, ?2, ?3)",
                params![user_id.to_string(), now.clone(), now],
            )
            .await
            .map_err(|e| StorageError::Query(format!("create_profile: {e}")))?;

        self.get_profile(user_id).await?.ok_or_else(|| {
            StorageError::Query(format!("profile {user_id} missing after create"))
        })
    }

    async fn update_profile(
        &self,
        user_id: &str,
        expected_version: i64,
        changes: &ProfileChanges,
    ) -> Result<CasOutcome, StorageError> {
        let partners_json = match &changes.partners {
            Some(list) => Some(
                serde_json::to_string(list)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        // COALESCE keeps untouched fields; fields only ever grow, so a sparse
        // write cannot regress the derived phase.
        let affected = self
            .conn()
            .execute(
                "UPDATE profiles SET
                    native_language = COALESCE(?1, native_language),
                    industry_id = COALESCE(?2, industry_id),
                    selected_role_id = COALESCE(?3, selected_role_id),
                    partners = COALESCE(?4, partners),
                    completed_at = COALESCE(?5, completed_at),
                    version = version + 1,
                    updated_at = ?6
                 WHERE user_id = ?7 AND version = ?8",
                params![
                    opt_text(changes.native_language.map(|l| l.to_string())),
                    opt_text(changes.industry_id.map(|id| id.to_string())),
                    opt_text(changes.selected_role_id.map(|id| id.to_string())),
                    opt_text(partners_json),
                    opt_text(changes.completed_at.map(|t| t.to_rfc3339())),
                    Utc::now().to_rfc3339(),
                    user_id.to_string(),
                    expected_version,
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("update_profile: {e}")))?;

        if affected == 0 {
            debug!(user_id, expected_version, "Profile CAS conflict");
            return Ok(CasOutcome::Conflict);
        }

        let updated = self.get_profile(user_id).await?.ok_or_else(|| {
            StorageError::Query(format!("profile {user_id} missing after update"))
        })?;
        debug!(user_id, version = updated.version, "Profile updated");
        Ok(CasOutcome::Applied(updated))
    }
}

#[async_trait]
impl RoleStore for LibSqlBackend {
    async fn insert_role(&self, role: &Role) -> Result<(), StorageError> {
        let embedding_json = match &role.embedding {
            Some(vector) => Some(
                serde_json::to_string(vector)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        self.conn()
            .execute(
                "INSERT INTO roles (id, title, description, industry_id, embedding, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    role.id.to_string(),
                    role.title.clone(),
                    role.description.clone(),
                    role.industry_id.to_string(),
                    opt_text(embedding_json),
                    opt_text(role.created_by.clone()),
                    role.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("insert_role: {e}")))?;

        debug!(role_id = %role.id, title = %role.title, "Role inserted");
        Ok(())
    }

    async fn get_role(&self, id: Uuid) -> Result<Option<Role>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_role: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let role = row_to_role(&row)
                    .map_err(|e| StorageError::Query(format!("get_role row parse: {e}")))?;
                Ok(Some(role))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get_role: {e}"))),
        }
    }

    async fn set_role_embedding(&self, id: Uuid, vector: &[f32]) -> Result<(), StorageError> {
        let embedding_json = serde_json::to_string(vector)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "UPDATE roles SET embedding = ?1 WHERE id = ?2",
                params![embedding_json, id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("set_role_embedding: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl IndustryCatalog for LibSqlBackend {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Industry>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name FROM industries WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("industry find_by_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_industry(&row).map_err(|e| {
                StorageError::Query(format!("industry row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("industry find_by_id: {e}"))),
        }
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Industry>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name FROM industries WHERE name = ?1 COLLATE NOCASE",
                params![name.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("industry find_by_name: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_industry(&row).map_err(|e| {
                StorageError::Query(format!("industry row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("industry find_by_name: {e}"))),
        }
    }
}

#[async_trait]
impl PartnerCatalog for LibSqlBackend {
    async fn list_active(&self) -> Result<Vec<Partner>, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, active FROM partners WHERE active = 1 ORDER BY name",
                (),
            )
            .await
            .map_err(|e| StorageError::Query(format!("list_active partners: {e}")))?;

        let mut partners = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StorageError::Query(format!("list_active partners: {e}")))?
        {
            partners.push(
                row_to_partner(&row)
                    .map_err(|e| StorageError::Query(format!("partner row parse: {e}")))?,
            );
        }
        Ok(partners)
    }

    async fn exists_and_active(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM partners WHERE id = ?1 AND active = 1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Query(format!("exists_and_active: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(StorageError::Query(format!("exists_and_active: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onboarding::model::{NativeLanguage, PartnerSelection};
    use crate::onboarding::state::OnboardingPhase;

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn create_and_get_profile() {
        let db = backend().await;
        let profile = db.create_profile("user-1").await.unwrap();
        assert_eq!(profile.user_id, "user-1");
        assert_eq!(profile.version, 0);
        assert_eq!(profile.phase(), OnboardingPhase::NotStarted);

        let fetched = db.get_profile("user-1").await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "user-1");
        assert!(db.get_profile("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_profile_is_idempotent() {
        let db = backend().await;
        db.create_profile("user-1").await.unwrap();

        let changes = ProfileChanges {
            native_language: Some(NativeLanguage::English),
            ..Default::default()
        };
        db.update_profile("user-1", 0, &changes).await.unwrap();

        // Re-creating must not wipe existing data
        let profile = db.create_profile("user-1").await.unwrap();
        assert_eq!(profile.native_language, Some(NativeLanguage::English));
        assert_eq!(profile.version, 1);
    }

    #[tokio::test]
    async fn cas_applies_and_bumps_version() {
        let db = backend().await;
        db.create_profile("user-1").await.unwrap();

        let changes = ProfileChanges {
            native_language: Some(NativeLanguage::Cantonese),
            ..Default::default()
        };
        let outcome = db.update_profile("user-1", 0, &changes).await.unwrap();
        match outcome {
            CasOutcome::Applied(profile) => {
                assert_eq!(profile.version, 1);
                assert_eq!(profile.native_language, Some(NativeLanguage::Cantonese));
                assert_eq!(profile.phase(), OnboardingPhase::LanguageSelected);
            }
            CasOutcome::Conflict => panic!("expected Applied"),
        }
    }

    #[tokio::test]
    async fn cas_conflicts_on_stale_version() {
        let db = backend().await;
        db.create_profile("user-1").await.unwrap();

        let changes = ProfileChanges {
            native_language: Some(NativeLanguage::English),
            ..Default::default()
        };
        db.update_profile("user-1", 0, &changes).await.unwrap();

        // Same expected version again — must conflict, and the stored value
        // must be untouched.
        let stale = ProfileChanges {
            native_language: Some(NativeLanguage::French),
            ..Default::default()
        };
        let outcome = db.update_profile("user-1", 0, &stale).await.unwrap();
        assert!(matches!(outcome, CasOutcome::Conflict));

        let profile = db.get_profile("user-1").await.unwrap().unwrap();
        assert_eq!(profile.native_language, Some(NativeLanguage::English));
        assert_eq!(profile.version, 1);
    }

    #[tokio::test]
    async fn partner_selection_is_fully_replaced() {
        let db = backend().await;
        db.create_profile("user-1").await.unwrap();

        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let p3 = Uuid::new_v4();

        let first = ProfileChanges {
            partners: Some(vec![
                PartnerSelection { partner_id: p1, priority: 1 },
                PartnerSelection { partner_id: p2, priority: 2 },
                PartnerSelection { partner_id: p3, priority: 3 },
            ]),
            ..Default::default()
        };
        db.update_profile("user-1", 0, &first).await.unwrap();

        let second = ProfileChanges {
            partners: Some(vec![
                PartnerSelection { partner_id: p3, priority: 1 },
                PartnerSelection { partner_id: p1, priority: 2 },
            ]),
            ..Default::default()
        };
        db.update_profile("user-1", 1, &second).await.unwrap();

        let profile = db.get_profile("user-1").await.unwrap().unwrap();
        assert_eq!(profile.partners.len(), 2);
        assert_eq!(profile.partners[0].partner_id, p3);
        assert_eq!(profile.partners[0].priority, 1);
        assert_eq!(profile.partners[1].partner_id, p1);
        assert_eq!(profile.partners[1].priority, 2);
    }

    #[tokio::test]
    async fn role_insert_get_and_embedding() {
        let db = backend().await;
        let industry = db.insert_industry("Technology").await.unwrap();

        let role = Role::new_custom("user-1", "Platform Engineer", "Runs infra", industry.id);
        db.insert_role(&role).await.unwrap();

        let fetched = db.get_role(role.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Platform Engineer");
        assert_eq!(fetched.created_by.as_deref(), Some("user-1"));
        assert!(fetched.embedding.is_none());

        db.set_role_embedding(role.id, &[0.1, 0.2, 0.3]).await.unwrap();
        let fetched = db.get_role(role.id).await.unwrap().unwrap();
        assert_eq!(fetched.embedding, Some(vec![0.1, 0.2, 0.3]));

        assert!(db.get_role(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn industry_catalog_resolves_by_id_and_name() {
        let db = backend().await;
        let industry = db.insert_industry("Healthcare").await.unwrap();

        let by_id = db.find_by_id(industry.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "Healthcare");

        let by_name = db.find_by_name("healthcare").await.unwrap().unwrap();
        assert_eq!(by_name.id, industry.id);

        assert!(db.find_by_name("Aerospace").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partner_catalog_filters_inactive() {
        let db = backend().await;
        let clients = db.insert_partner("Clients", true).await.unwrap();
        let retired = db.insert_partner("Retired", false).await.unwrap();

        let active = db.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "Clients");

        assert!(db.exists_and_active(clients.id).await.unwrap());
        assert!(!db.exists_and_active(retired.id).await.unwrap());
        assert!(!db.exists_and_active(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn local_file_db_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fluentpro.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.create_profile("user-1").await.unwrap();
        }

        // Reopen — migrations must be idempotent and data intact.
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let profile = db.get_profile("user-1").await.unwrap().unwrap();
        assert_eq!(profile.user_id, "user-1");
    }
}
