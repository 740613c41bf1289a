// Error taxonomy shared by both processes
pub mod error;

// Configuration (TOML + environment overrides)
pub mod config;

// Signed flow state carried through the OAuth redirect
pub mod state_codec;

// Authorization flow controller and token endpoint calls
pub mod oauth;

// Session file (credential records keyed by session ID)
pub mod credentials;

// Active session selection and token refresh for the tool server
pub mod session;

// HTTP surface of the authorization server
pub mod api;

pub use error::BridgeError;
