// Session bookkeeping module
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{default_title, Session, SessionRegistry};

use once_cell::sync::Lazy;
use regex::Regex;

static SESSION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("static regex is valid"));

/// Session ids are opaque but must be safe as a path segment and store scope.
pub fn is_valid_session_id(id: &str) -> bool {
    SESSION_ID.is_match(id)
}
