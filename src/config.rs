use std::path::PathBuf;
use std::time::Duration;

// Tuning knobs for a session. Defaults match the shipped application: the
// refresh cooldown collapses double-mount triggers into one logical refresh,
// the note debounce batches keystrokes into a single autosave.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub storage_path: Option<PathBuf>,
    pub refresh_cooldown: Duration,
    pub note_autosave_debounce: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            refresh_cooldown: Duration::from_millis(400),
            note_autosave_debounce: Duration::from_millis(700),
        }
    }
}

impl CoreConfig {
    pub fn with_storage_path(path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: Some(path.into()),
            ..Self::default()
        }
    }
}
