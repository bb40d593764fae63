pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod flavor;
pub mod notifier;
pub mod reconcile;
pub mod tree;
pub mod watcher;

pub use config::WatchConfig;
pub use error::{NotifierError, Result, WatchError};
pub use events::*;
pub use filter::FilterPair;
pub use flavor::{translate, Flavor};
pub use notifier::{Notifier, NotifierConfig};
pub use reconcile::Reconciler;
pub use tree::{EntryKind, TreeCache};
pub use watcher::*;
