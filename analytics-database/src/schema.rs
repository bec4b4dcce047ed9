/*!
Schema for the platform entity store.

Used by the platform installer and by tests that need a populated store.
*/

use rusqlite::{Connection, Result as SqlResult};

/// Create the entity store tables if they do not exist yet.
pub fn create_schema(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sites (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            main_url TEXT,
            created_at TEXT
        );

        CREATE TABLE IF NOT EXISTS containers (
            id INTEGER PRIMARY KEY,
            site_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            created_at TEXT
        );

        CREATE TABLE IF NOT EXISTS container_versions (
            id INTEGER PRIMARY KEY,
            container_id INTEGER NOT NULL,
            revision INTEGER NOT NULL,
            name TEXT,
            created_at TEXT
        );

        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY,
            container_version_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            tag_type TEXT
        );

        CREATE TABLE IF NOT EXISTS triggers (
            id INTEGER PRIMARY KEY,
            container_version_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            trigger_type TEXT
        );

        CREATE TABLE IF NOT EXISTS variables (
            id INTEGER PRIMARY KEY,
            container_version_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            variable_type TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_containers_site ON containers(site_id);
        CREATE INDEX IF NOT EXISTS idx_versions_container ON container_versions(container_id);
        CREATE INDEX IF NOT EXISTS idx_tags_version ON tags(container_version_id);
        CREATE INDEX IF NOT EXISTS idx_triggers_version ON triggers(container_version_id);
        CREATE INDEX IF NOT EXISTS idx_variables_version ON variables(container_version_id);
    "#,
    )?;

    Ok(())
}
