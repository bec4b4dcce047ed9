/*!
Read models for the analytics platform entity store.

Connects to the platform's SQLite database and resolves sites, tag containers,
container versions and container entities (tags, triggers, variables) by id.
The connection is read-only; writes belong to the platform itself.
*/

pub mod schema;
pub mod store;

pub use store::{AnalyticsDatabase, Container, ContainerVersion, EntityKind, Site};
