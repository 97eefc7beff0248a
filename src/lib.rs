pub mod adapters;
pub mod backend;
pub mod collection;
pub mod config;
pub mod db;
pub mod directory;
pub mod errors;
pub mod invites;
pub mod memory;
pub mod models;
pub mod selection;
pub mod session;

pub use crate::adapters::groceries::GroceriesAdapter;
pub use crate::adapters::notes::{NotePad, NotesAdapter};
pub use crate::adapters::tasks::TasksAdapter;
pub use crate::adapters::ItemStore;
pub use crate::backend::Backend;
pub use crate::collection::Collection;
pub use crate::config::CoreConfig;
pub use crate::directory::DirectoryService;
pub use crate::errors::{AppError, AppResult};
pub use crate::invites::InviteChannel;
pub use crate::memory::MemoryBackend;
pub use crate::models::{
    GroceryDraft, GroceryEntry, GroceryPatch, Invitation, InviteStatus, List, ListEntry, ListKind,
    Membership, NewList, Note, NoteDraft, Notice, NoticeLevel, NoticeReceiver, NoticeSender,
    PendingInvite, Priority, Role, TaskDraft, TaskItem, TaskPatch, UserProfile,
};
pub use crate::selection::SelectionManager;
pub use crate::session::Session;

use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

// Installs the global tracing subscriber. With a log directory, output goes
// to a daily-rolling file through a non-blocking writer; without one it
// goes to stderr. Safe to call more than once; only the first call wins.
pub fn init_logging(log_dir: Option<&Path>) -> Result<(), String> {
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|error| error.to_string())?;
            let file_appender = tracing_appender::rolling::daily(dir, "listhub.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = LOG_GUARD.set(guard);

            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(non_blocking)
                .try_init()
                .map_err(|error| error.to_string())
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| error.to_string()),
    }
}
