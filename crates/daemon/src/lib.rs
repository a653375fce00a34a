// resq Daemon - Composition Root
// Settings, store selection and built-in tasks shared by the daemon and the CLI

pub mod logging;
pub mod settings;
pub mod store;
pub mod tasks;

pub use logging::init_tracing;
pub use settings::{load_settings, load_settings_from};
pub use store::open_queue_store;
pub use tasks::builtin_registry;
