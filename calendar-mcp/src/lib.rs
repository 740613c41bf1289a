//! MCP tool server exposing Google Calendar.
//!
//! Boots from the session file written by the authorization server and
//! forwards tool calls to the Calendar REST API with the stored bearer token.

pub mod client;
pub mod protocol;
pub mod server;
pub mod tools;
