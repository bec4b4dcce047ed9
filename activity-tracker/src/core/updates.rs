/*!
Versioned update steps applied to the platform configuration during an
upgrade.

Each step runs at most once: the state database records the version a
component has been migrated to, and only steps newer than that version are
applied. Steps mutate the config in memory; the caller persists the store
after a successful run.
*/

use std::cmp::Ordering;
use tracing::info;

use crate::core::config_store::ConfigStore;
use crate::core::state_manager::StateManager;

pub const CORE_COMPONENT: &str = "core";

/// One versioned, one-time configuration migration.
pub trait UpdateStep: Send + Sync {
    /// The component version this step migrates to.
    fn version(&self) -> &'static str;

    fn apply(&self, config: &mut ConfigStore) -> Result<(), Box<dyn std::error::Error>>;
}

/// Removes plugins that no longer ship with the platform from the
/// activated-plugins list.
pub struct RemoveDeprecatedPlugins;

impl UpdateStep for RemoveDeprecatedPlugins {
    fn version(&self) -> &'static str {
        "2.0.0-b10"
    }

    fn apply(&self, config: &mut ConfigStore) -> Result<(), Box<dyn std::error::Error>> {
        config.delete_plugin("Referers");
        config.delete_plugin("PDFReports");
        Ok(())
    }
}

/// Runs pending update steps in registration order
pub struct Updater {
    steps: Vec<Box<dyn UpdateStep>>,
}

impl Updater {
    pub fn new(steps: Vec<Box<dyn UpdateStep>>) -> Self {
        Self { steps }
    }

    /// The update steps shipped with this release.
    pub fn with_default_steps() -> Self {
        Self::new(vec![Box::new(RemoveDeprecatedPlugins)])
    }

    /// Apply every step newer than the component's recorded version and
    /// record each applied version. Returns the number of steps applied;
    /// the caller persists the config store afterwards.
    pub async fn run(
        &self,
        config: &mut ConfigStore,
        state: &StateManager,
    ) -> Result<usize, Box<dyn std::error::Error>> {
        let recorded = state
            .component_version(CORE_COMPONENT)
            .await?
            .unwrap_or_else(|| "0.0.0".to_string());

        let mut applied = 0;
        for step in &self.steps {
            if version_cmp(step.version(), &recorded) != Ordering::Greater {
                continue;
            }

            info!("Applying config update {}", step.version());
            step.apply(config)?;
            state
                .record_component_version(CORE_COMPONENT, step.version())
                .await?;
            applied += 1;
        }

        Ok(applied)
    }
}

/// Compare dotted versions with optional pre-release suffixes, e.g.
/// `2.0.0-b9 < 2.0.0-b10 < 2.0.0 < 2.1.0`.
pub fn version_cmp(a: &str, b: &str) -> Ordering {
    let (a_release, a_pre) = split_pre(a);
    let (b_release, b_pre) = split_pre(b);

    let a_parts = numeric_parts(a_release);
    let b_parts = numeric_parts(b_release);
    let len = a_parts.len().max(b_parts.len());

    for i in 0..len {
        let x = a_parts.get(i).copied().unwrap_or(0);
        let y = b_parts.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    // Equal release: a pre-release sorts before the release itself.
    match (a_pre, b_pre) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => pre_cmp(x, y),
    }
}

fn split_pre(version: &str) -> (&str, Option<&str>) {
    match version.split_once('-') {
        Some((release, pre)) => (release, Some(pre)),
        None => (version, None),
    }
}

fn numeric_parts(release: &str) -> Vec<u64> {
    release
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

fn pre_cmp(a: &str, b: &str) -> Ordering {
    let split = |s: &str| {
        let digits_at = s.find(|c: char| c.is_ascii_digit()).unwrap_or(s.len());
        let (tag, num) = s.split_at(digits_at);
        (tag.to_string(), num.parse::<u64>().unwrap_or(0))
    };

    let (a_tag, a_num) = split(a);
    let (b_tag, b_num) = split(b);

    a_tag.cmp(&b_tag).then(a_num.cmp(&b_num))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StateConfig;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    static NEXT_STATE: AtomicUsize = AtomicUsize::new(0);

    async fn temp_state() -> (StateManager, std::path::PathBuf) {
        let n = NEXT_STATE.fetch_add(1, AtomicOrdering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "activity-tracker-updates-{}-{}.db",
            std::process::id(),
            n
        ));
        let manager = StateManager::new(StateConfig {
            state_db_path: path.clone(),
            retention_days: 30,
        })
        .await
        .unwrap();
        (manager, path)
    }

    fn config_with_deprecated_plugins() -> ConfigStore {
        ConfigStore::from_table(
            r#"
                [plugins]
                activated = ["CoreHome", "Referers", "PDFReports", "TagManager"]
            "#
            .parse()
            .unwrap(),
        )
    }

    #[test]
    fn version_ordering() {
        assert_eq!(version_cmp("2.0.0-b9", "2.0.0-b10"), Ordering::Less);
        assert_eq!(version_cmp("2.0.0-b10", "2.0.0"), Ordering::Less);
        assert_eq!(version_cmp("2.0.0", "2.1.0"), Ordering::Less);
        assert_eq!(version_cmp("2.1.0", "2.0.9"), Ordering::Greater);
        assert_eq!(version_cmp("2.0.0-b10", "2.0.0-b10"), Ordering::Equal);
        assert_eq!(version_cmp("2.0", "2.0.0"), Ordering::Equal);
    }

    #[test]
    fn remove_deprecated_plugins_clears_both_entries() {
        let mut config = config_with_deprecated_plugins();
        RemoveDeprecatedPlugins.apply(&mut config).unwrap();

        assert!(!config.has_plugin("Referers"));
        assert!(!config.has_plugin("PDFReports"));
        assert!(config.has_plugin("TagManager"));
    }

    #[test]
    fn remove_deprecated_plugins_is_idempotent() {
        let mut config = config_with_deprecated_plugins();
        RemoveDeprecatedPlugins.apply(&mut config).unwrap();
        let after_first = config.activated_plugins();

        RemoveDeprecatedPlugins.apply(&mut config).unwrap();
        assert_eq!(config.activated_plugins(), after_first);
    }

    #[tokio::test]
    async fn updater_applies_pending_steps_once() {
        let (state, path) = temp_state().await;
        let mut config = config_with_deprecated_plugins();
        let updater = Updater::with_default_steps();

        let applied = updater.run(&mut config, &state).await.unwrap();
        assert_eq!(applied, 1);
        assert!(!config.has_plugin("Referers"));
        assert_eq!(
            state.component_version(CORE_COMPONENT).await.unwrap().as_deref(),
            Some("2.0.0-b10")
        );

        // Already at the recorded version: nothing to do.
        let applied = updater.run(&mut config, &state).await.unwrap();
        assert_eq!(applied, 0);

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn updater_skips_steps_at_or_below_recorded_version() {
        let (state, path) = temp_state().await;
        state
            .record_component_version(CORE_COMPONENT, "2.0.0")
            .await
            .unwrap();

        let mut config = config_with_deprecated_plugins();
        let applied = Updater::with_default_steps()
            .run(&mut config, &state)
            .await
            .unwrap();

        assert_eq!(applied, 0);
        assert!(config.has_plugin("Referers"));

        std::fs::remove_file(path).ok();
    }
}
