pub mod client_config;
pub mod event;
pub mod script;
pub mod submit;

pub use self::client_config::{BackendConfig, ChannelConfig, ClientConfig, ConfigError};
pub use self::event::{PushEvent, events_path};
pub use self::script::{Scene, Script, VERSION_SLOTS};
pub use self::submit::{SUBMIT_PATH, SubmitRequest, SubmitResponse};
