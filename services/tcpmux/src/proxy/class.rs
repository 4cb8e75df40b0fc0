//! Forwarding classes.

use std::fmt;

use tcpmux_classify::Matcher;

/// A forwarding category with its own backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    /// HTTP/1.x requests and HTTP/2 prior-knowledge connections.
    Http,
    /// TLS handshakes.
    Tls,
    /// Everything not claimed by an earlier class.
    Rest,
}

impl Class {
    /// All classes in matching priority order.
    pub const ALL: [Class; 3] = [Class::Http, Class::Tls, Class::Rest];

    /// Predicates that select this class.
    pub fn matchers(self) -> &'static [Matcher] {
        match self {
            Class::Http => &[Matcher::Http1, Matcher::Http2],
            Class::Tls => &[Matcher::Tls],
            Class::Rest => &[Matcher::Any],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Class::Http => "HTTP",
            Class::Tls => "TLS",
            Class::Rest => "Rest",
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
