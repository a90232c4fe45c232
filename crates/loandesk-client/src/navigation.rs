//! Active route and forced navigation
//!
//! Rendering is out of scope; this only tracks where the user is and lets
//! interested parties follow route changes.

use std::fmt;
use tokio::sync::watch;

/// Top-level segments that are not organization identifiers
const RESERVED_SEGMENTS: [&str; 3] = ["login", "forgot-password", "not-found"];

/// Application route path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route(String);

impl Route {
    pub const LOGIN: &'static str = "/login";
    pub const FORGOT_PASSWORD: &'static str = "/forgot-password";
    pub const NOT_FOUND: &'static str = "/not-found";

    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        if path.starts_with('/') {
            Self(path)
        } else {
            Self(format!("/{path}"))
        }
    }

    #[must_use]
    pub fn login() -> Self {
        Self(Self::LOGIN.to_string())
    }

    #[must_use]
    pub fn not_found() -> Self {
        Self(Self::NOT_FOUND.to_string())
    }

    /// Landing page of an organization workspace
    #[must_use]
    pub fn workspace(organization: &str) -> Self {
        Self(format!("/{organization}/dashboard"))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Organization identifier in the first path segment
    #[must_use]
    pub fn organization_segment(&self) -> Option<&str> {
        self.0
            .split('/')
            .find(|segment| !segment.is_empty())
            .filter(|segment| !RESERVED_SEGMENTS.contains(segment))
    }

    /// Whether the route is reachable without a session
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.0 == Self::LOGIN || self.0 == Self::FORGOT_PASSWORD || self.0 == Self::NOT_FOUND
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Holder of the active route
#[derive(Debug)]
pub struct Navigation {
    current: watch::Sender<Route>,
}

impl Navigation {
    #[must_use]
    pub fn new(initial: Route) -> Self {
        let (current, _) = watch::channel(initial);
        Self { current }
    }

    /// Active route
    #[must_use]
    pub fn current(&self) -> Route {
        self.current.borrow().clone()
    }

    /// Replace the active route
    pub fn navigate(&self, route: Route) {
        tracing::debug!(route = %route, "navigate");
        self.current.send_replace(route);
    }

    /// Follow route changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Route> {
        self.current.subscribe()
    }
}

impl Default for Navigation {
    fn default() -> Self {
        Self::new(Route::login())
    }
}
