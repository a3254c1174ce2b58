mod admin;
mod traits;

pub use admin::{AdminClient, SETTINGS_KEY, SETTINGS_NAMESPACE};
pub use traits::{AccessToken, PlatformApi};
