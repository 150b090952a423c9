pub mod settings;

pub use settings::{BackendKind, Settings, DEFAULT_CONFIG_FILE, ENV_PREFIX};
