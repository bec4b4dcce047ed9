/*!
Read-only access to the platform entity store.

Sites are few and looked up constantly, so they are cached at open time.
Container and entity names are resolved with prepared queries on demand.
*/

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, Result as SqlResult, Row};
use std::collections::HashMap;
use std::path::Path;

/// A tracked website.
#[derive(Debug, Clone)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub main_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A tag-management container belonging to a site.
#[derive(Debug, Clone)]
pub struct Container {
    pub id: i64,
    pub site_id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// One revision of a container's configuration.
#[derive(Debug, Clone)]
pub struct ContainerVersion {
    pub id: i64,
    pub container_id: i64,
    pub revision: i64,
    pub name: Option<String>,
}

/// The kinds of entities a container version holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Tag,
    Trigger,
    Variable,
}

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Tag => "tags",
            EntityKind::Trigger => "triggers",
            EntityKind::Variable => "variables",
        }
    }

    /// Lowercase noun used in human-readable descriptions.
    pub fn noun(&self) -> &'static str {
        match self {
            EntityKind::Tag => "tag",
            EntityKind::Trigger => "trigger",
            EntityKind::Variable => "variable",
        }
    }
}

pub struct AnalyticsDatabase {
    conn: Connection,
    site_cache: HashMap<i64, Site>,
}

impl AnalyticsDatabase {
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqlResult<Self> {
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

        let mut db = Self {
            conn,
            site_cache: HashMap::new(),
        };

        db.load_sites()?;

        Ok(db)
    }

    fn load_sites(&mut self) -> SqlResult<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, main_url, created_at FROM sites")?;

        let site_iter = stmt.query_map([], |row| Self::row_to_site(row))?;

        for site in site_iter {
            let site = site?;
            self.site_cache.insert(site.id, site);
        }

        Ok(())
    }

    pub fn site(&self, site_id: i64) -> Option<&Site> {
        self.site_cache.get(&site_id)
    }

    pub fn site_name(&self, site_id: i64) -> Option<&str> {
        self.site_cache.get(&site_id).map(|s| s.name.as_str())
    }

    pub fn site_count(&self) -> usize {
        self.site_cache.len()
    }

    pub fn container(&self, container_id: i64) -> SqlResult<Option<Container>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, site_id, name, description FROM containers WHERE id = ?1",
        )?;

        let container = stmt.query_row([container_id], |row| {
            Ok(Container {
                id: row.get(0)?,
                site_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
            })
        });

        match container {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn container_name(&self, container_id: i64) -> SqlResult<Option<String>> {
        Ok(self.container(container_id)?.map(|c| c.name))
    }

    pub fn containers_for_site(&self, site_id: i64) -> SqlResult<Vec<Container>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, site_id, name, description FROM containers
             WHERE site_id = ?1
             ORDER BY id ASC",
        )?;

        let container_iter = stmt.query_map([site_id], |row| {
            Ok(Container {
                id: row.get(0)?,
                site_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
            })
        })?;

        let mut containers = Vec::new();
        for container in container_iter {
            containers.push(container?);
        }

        Ok(containers)
    }

    pub fn container_version(&self, version_id: i64) -> SqlResult<Option<ContainerVersion>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, container_id, revision, name FROM container_versions WHERE id = ?1",
        )?;

        let version = stmt.query_row([version_id], |row| {
            Ok(ContainerVersion {
                id: row.get(0)?,
                container_id: row.get(1)?,
                revision: row.get(2)?,
                name: row.get(3)?,
            })
        });

        match version {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolve the name of a tag, trigger or variable by id.
    pub fn entity_name(&self, kind: EntityKind, entity_id: i64) -> SqlResult<Option<String>> {
        let query = format!("SELECT name FROM {} WHERE id = ?1", kind.table());
        let mut stmt = self.conn.prepare(&query)?;

        let name = stmt.query_row([entity_id], |row| row.get::<_, String>(0));

        match name {
            Ok(n) => Ok(Some(n)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn entity_count(&self, kind: EntityKind) -> SqlResult<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", kind.table());
        let mut stmt = self.conn.prepare(&query)?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_site(row: &Row) -> SqlResult<Site> {
        let created_at: Option<String> = row.get(3)?;

        Ok(Site {
            id: row.get(0)?,
            name: row.get(1)?,
            main_url: row.get(2)?,
            created_at: created_at
                .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::create_schema;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

    fn temp_db_path() -> PathBuf {
        let n = NEXT_DB.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "analytics-database-test-{}-{}.db",
            std::process::id(),
            n
        ))
    }

    fn populated_db() -> PathBuf {
        let path = temp_db_path();
        let conn = Connection::open(&path).unwrap();
        create_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO sites (id, name, main_url, created_at)
             VALUES (3, 'Demo', 'https://demo.example', '2024-01-10T09:00:00+00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO containers (id, site_id, name) VALUES (12, 3, 'Main Container')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO container_versions (id, container_id, revision) VALUES (2, 12, 5)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO variables (id, container_version_id, name, variable_type)
             VALUES (7, 2, 'utm_source', 'url_parameter')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tags (id, container_version_id, name) VALUES (21, 2, 'Pageview Tag')",
            [],
        )
        .unwrap();

        path
    }

    #[test]
    fn sites_are_cached_at_open() {
        let path = populated_db();
        let db = AnalyticsDatabase::new(&path).unwrap();

        assert_eq!(db.site_count(), 1);
        let site = db.site(3).unwrap();
        assert_eq!(site.name, "Demo");
        assert!(site.created_at.is_some());
        assert_eq!(db.site_name(99), None);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn container_and_entity_lookups() {
        let path = populated_db();
        let db = AnalyticsDatabase::new(&path).unwrap();

        assert_eq!(db.container_name(12).unwrap().as_deref(), Some("Main Container"));
        assert_eq!(db.container_name(99).unwrap(), None);

        let version = db.container_version(2).unwrap().unwrap();
        assert_eq!(version.container_id, 12);
        assert_eq!(version.revision, 5);

        assert_eq!(
            db.entity_name(EntityKind::Variable, 7).unwrap().as_deref(),
            Some("utm_source")
        );
        assert_eq!(
            db.entity_name(EntityKind::Tag, 21).unwrap().as_deref(),
            Some("Pageview Tag")
        );
        assert_eq!(db.entity_name(EntityKind::Trigger, 1).unwrap(), None);
        assert_eq!(db.entity_count(EntityKind::Variable).unwrap(), 1);

        std::fs::remove_file(path).ok();
    }
}
