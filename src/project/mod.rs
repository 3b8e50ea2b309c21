//! The project folder: a directory tree that mirrors a package.
//!
//! [`ProjectFolder`] is a thin facade over one directory. Writes made through
//! folders obtained from a [`SyncPass`] are recorded, and the pass deletes
//! whatever was there before and was not written again.

mod folder;
mod root;
mod settings;

pub use folder::{ProjectFile, ProjectFolder};
pub use root::{KnownFiles, PassSummary, ProjectRootFolder, SyncPass};
pub use settings::{ModelSettings, ProjectSettings, SETTINGS_FILE, Settings};
