pub mod google_auth;
pub mod sheets;

pub use google_auth::{GoogleAuth, GoogleAuthConfig, GoogleAuthError};
pub use sheets::{AppendResult, SheetsClient, SheetsError, TokenSource};
