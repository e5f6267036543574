//! OAuth 2.0 plumbing for the log source: credential caching, silent refresh, and the
//! interactive authorization-code fallback.

mod browser;
mod credential;
mod endpoints;
mod login;
mod refresh;
mod sniffer;

pub use browser::{BrowserLogin, InteractiveLogin};
pub use credential::{Credential, TokenSource};
pub use endpoints::SourceOauthEndpoints;
pub use login::{SourceTokens, login};
pub use refresh::RefreshingTokenSource;
pub use sniffer::TokenSniffer;
