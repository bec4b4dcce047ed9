/*!
Registry-based activity descriptors for completed API calls.

One handler per (API method, activity kind) pair. Each handler self-filters
by method name, extracts the activity payload from the call parameters, and
renders a human-readable description through an explicitly passed name
resolver.
*/

use analytics_database::{AnalyticsDatabase, EntityKind};
use tracing::{info, warn};

use crate::core::event_system::ApiEvent;
use crate::core::state_manager::{ActivityData, ActivityRecord};

type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Resolves human-readable names for the identifiers in an activity payload.
/// The entity database implements this; tests substitute stubs.
pub trait NameResolver {
    fn site_name(&self, data: &ActivityData) -> Result<Option<String>, HandlerError>;
    fn container_name(&self, data: &ActivityData) -> Result<Option<String>, HandlerError>;
    fn entity_name(
        &self,
        kind: EntityKind,
        data: &ActivityData,
    ) -> Result<Option<String>, HandlerError>;
}

impl NameResolver for AnalyticsDatabase {
    fn site_name(&self, data: &ActivityData) -> Result<Option<String>, HandlerError> {
        Ok(self.site(data.site_id).map(|s| s.name.clone()))
    }

    fn container_name(&self, data: &ActivityData) -> Result<Option<String>, HandlerError> {
        Ok(self.container(data.container_id)?.map(|c| c.name))
    }

    fn entity_name(
        &self,
        kind: EntityKind,
        data: &ActivityData,
    ) -> Result<Option<String>, HandlerError> {
        Ok(AnalyticsDatabase::entity_name(self, kind, data.entity_id)?)
    }
}

/// Trait for activity descriptor handlers
pub trait ActivityHandler: Send + Sync {
    /// Activity kind recorded with each matching event
    fn name(&self) -> &'static str;

    /// The API method this handler is interested in
    fn api_method(&self) -> &'static str;

    /// Extract the activity payload from a completed API call. Returns None
    /// for calls to any other method, and for matching calls whose required
    /// parameters are absent.
    fn extract_params(&self, event: &ApiEvent) -> Option<ActivityData>;

    /// Render the human-readable description for a recorded activity.
    fn describe(
        &self,
        data: &ActivityData,
        resolver: &dyn NameResolver,
    ) -> Result<String, HandlerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityAction {
    Created,
    Updated,
    Deleted,
}

impl EntityAction {
    fn verb(&self) -> &'static str {
        match self {
            EntityAction::Created => "created",
            EntityAction::Updated => "updated",
            EntityAction::Deleted => "deleted",
        }
    }
}

/// Handler for the tag-management entity lifecycle: one value per
/// (entity kind, action) pair, all sharing the same payload shape.
pub struct EntityActivityHandler {
    kind: EntityKind,
    action: EntityAction,
}

impl EntityActivityHandler {
    pub fn new(kind: EntityKind, action: EntityAction) -> Self {
        Self { kind, action }
    }

    fn id_key(&self) -> &'static str {
        match self.kind {
            EntityKind::Tag => "idTag",
            EntityKind::Trigger => "idTrigger",
            EntityKind::Variable => "idVariable",
        }
    }
}

impl ActivityHandler for EntityActivityHandler {
    fn name(&self) -> &'static str {
        match (self.kind, self.action) {
            (EntityKind::Tag, EntityAction::Created) => "tag_created",
            (EntityKind::Tag, EntityAction::Updated) => "tag_updated",
            (EntityKind::Tag, EntityAction::Deleted) => "tag_deleted",
            (EntityKind::Trigger, EntityAction::Created) => "trigger_created",
            (EntityKind::Trigger, EntityAction::Updated) => "trigger_updated",
            (EntityKind::Trigger, EntityAction::Deleted) => "trigger_deleted",
            (EntityKind::Variable, EntityAction::Created) => "variable_created",
            (EntityKind::Variable, EntityAction::Updated) => "variable_updated",
            (EntityKind::Variable, EntityAction::Deleted) => "variable_deleted",
        }
    }

    fn api_method(&self) -> &'static str {
        match (self.kind, self.action) {
            (EntityKind::Tag, EntityAction::Created) => "addContainerTag",
            (EntityKind::Tag, EntityAction::Updated) => "updateContainerTag",
            (EntityKind::Tag, EntityAction::Deleted) => "deleteContainerTag",
            (EntityKind::Trigger, EntityAction::Created) => "addContainerTrigger",
            (EntityKind::Trigger, EntityAction::Updated) => "updateContainerTrigger",
            (EntityKind::Trigger, EntityAction::Deleted) => "deleteContainerTrigger",
            (EntityKind::Variable, EntityAction::Created) => "addContainerVariable",
            (EntityKind::Variable, EntityAction::Updated) => "updateContainerVariable",
            (EntityKind::Variable, EntityAction::Deleted) => "deleteContainerVariable",
        }
    }

    fn extract_params(&self, event: &ApiEvent) -> Option<ActivityData> {
        if event.method != self.api_method() {
            return None;
        }

        let entity_id = event.int_param(self.id_key());
        let site_id = event.int_param("idSite");
        let container_id = event.int_param("idContainer");
        let container_version_id = event.int_param("idContainerVersion");

        match (entity_id, site_id, container_id, container_version_id) {
            (Some(entity), Some(site), Some(container), Some(version)) => {
                Some(ActivityData::new(site, container, version, entity))
            }
            _ => {
                warn!(
                    "Event for {} is missing required parameters, skipping",
                    event.method
                );
                None
            }
        }
    }

    fn describe(
        &self,
        data: &ActivityData,
        resolver: &dyn NameResolver,
    ) -> Result<String, HandlerError> {
        let site_name = resolver
            .site_name(data)?
            .unwrap_or_else(|| format!("#{}", data.site_id));
        let entity_name = resolver
            .entity_name(self.kind, data)?
            .unwrap_or_else(|| format!("#{}", data.entity_id));
        let container_name = resolver
            .container_name(data)?
            .unwrap_or_else(|| format!("#{}", data.container_id));

        Ok(format!(
            "{} the {} \"{}\" in container \"{}\" for site \"{}\"",
            self.action.verb(),
            self.kind.noun(),
            entity_name,
            container_name,
            site_name
        ))
    }
}

/// Main engine that dispatches API events across the handler registry
pub struct ActivityEngine {
    handlers: Vec<Box<dyn ActivityHandler>>,
}

impl ActivityEngine {
    /// Engine with the full tag-management handler registry.
    pub fn new() -> Self {
        let kinds = [EntityKind::Tag, EntityKind::Trigger, EntityKind::Variable];
        let actions = [
            EntityAction::Created,
            EntityAction::Updated,
            EntityAction::Deleted,
        ];

        let mut handlers: Vec<Box<dyn ActivityHandler>> = Vec::new();
        for kind in kinds {
            for action in actions {
                handlers.push(Box::new(EntityActivityHandler::new(kind, action)));
            }
        }

        info!("Initialized activity engine with {} handlers", handlers.len());
        Self { handlers }
    }

    pub fn with_handlers(handlers: Vec<Box<dyn ActivityHandler>>) -> Self {
        Self { handlers }
    }

    /// Dispatch one completed API call across the registry. Non-matching
    /// handlers bail out on the method-name guard; matching handlers yield a
    /// described activity record ready for persistence.
    pub fn process_event(
        &self,
        event: &ApiEvent,
        resolver: &dyn NameResolver,
    ) -> Vec<ActivityRecord> {
        let mut records = Vec::new();

        for handler in &self.handlers {
            let Some(data) = handler.extract_params(event) else {
                continue;
            };

            match handler.describe(&data, resolver) {
                Ok(description) => {
                    records.push(ActivityRecord {
                        id: 0, // Will be set by the state manager
                        activity_kind: handler.name().to_string(),
                        data,
                        performing_user: event.performing_user.clone(),
                        timestamp: event.timestamp,
                        description,
                    });
                }
                Err(e) => {
                    warn!(
                        "Handler {} failed to describe activity for {}: {}",
                        handler.name(),
                        event.method,
                        e
                    );
                }
            }
        }

        records
    }
}

impl Default for ActivityEngine {
    fn default() -> Self {
        Self::new()
    }
}
