//! tcpmux configuration.
//!
//! Command-line flags with environment fallbacks, turned into an immutable
//! [`Target`] and [`MuxOptions`] once at startup.

use std::ffi::OsString;
use std::time::Duration;

use clap::Parser;
use tcpmux_classify::ClassifierConfig;

use crate::proxy::{Class, MuxOptions};

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

/// Long flags also accepted with a single leading dash (`-http-proxy`).
const LONG_FLAGS: &[&str] = &[
    "bind",
    "http",
    "http-proxy",
    "tls",
    "tls-proxy",
    "rest",
    "rest-proxy",
    "legal",
    "log-level",
    "connect-timeout-ms",
    "sniff-timeout-ms",
    "drain-timeout-secs",
];

/// Share one TCP port between HTTP, TLS and other services.
#[derive(Debug, Clone, Parser)]
#[command(name = "tcpmux")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Bind to specific address.
    #[arg(long, env = "TCPMUX_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Forward HTTP/1 and HTTP/2 connections to this address (empty disables).
    #[arg(long, env = "TCPMUX_HTTP", default_value = "")]
    pub http: String,

    /// Send a PROXY protocol header on HTTP connections.
    #[arg(long)]
    pub http_proxy: bool,

    /// Forward TLS connections to this address (empty disables).
    #[arg(long, env = "TCPMUX_TLS", default_value = "")]
    pub tls: String,

    /// Send a PROXY protocol header on TLS connections.
    #[arg(long)]
    pub tls_proxy: bool,

    /// Forward remaining connections to this address (empty disables).
    #[arg(long, env = "TCPMUX_REST", default_value = "")]
    pub rest: String,

    /// Send a PROXY protocol header on remaining connections.
    #[arg(long)]
    pub rest_proxy: bool,

    /// Print legal notices and exit.
    #[arg(long)]
    pub legal: bool,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, env = "TCPMUX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Backend dial timeout in milliseconds (default: OS timeout).
    #[arg(long, env = "TCPMUX_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: Option<u64>,

    /// Close connections that do not classify within this many milliseconds.
    #[arg(long, env = "TCPMUX_SNIFF_TIMEOUT_MS")]
    pub sniff_timeout_ms: Option<u64>,

    /// Stop waiting for open sessions this many seconds after shutdown starts
    /// (default: wait indefinitely).
    #[arg(long, env = "TCPMUX_DRAIN_TIMEOUT_SECS")]
    pub drain_timeout_secs: Option<u64>,
}

impl Config {
    /// Parse the process arguments, exiting with usage on error.
    pub fn from_args() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    /// Parse an explicit argument list (first item is the program name).
    pub fn try_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_args(args))
    }

    /// Per-class forwarding targets.
    pub fn target(&self) -> Target {
        Target {
            http: ClassTarget::new(&self.http, self.http_proxy),
            tls: ClassTarget::new(&self.tls, self.tls_proxy),
            rest: ClassTarget::new(&self.rest, self.rest_proxy),
        }
    }

    pub fn mux_options(&self) -> MuxOptions {
        MuxOptions {
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            drain_timeout: self.drain_timeout_secs.map(Duration::from_secs),
            classifier: ClassifierConfig {
                sniff_timeout: self.sniff_timeout_ms.map(Duration::from_millis),
                ..ClassifierConfig::default()
            },
        }
    }
}

/// Rewrite `-flag` / `-flag=value` to `--flag` for known long flags.
fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .enumerate()
        .map(|(index, arg)| {
            if index == 0 {
                return arg;
            }
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let Some(flag) = text.strip_prefix('-').filter(|rest| !rest.starts_with('-')) else {
                return arg;
            };
            let name = flag.split_once('=').map_or(flag, |(name, _)| name);
            if LONG_FLAGS.contains(&name) {
                OsString::from(format!("-{text}"))
            } else {
                arg
            }
        })
        .collect()
}

/// Backend and header policy for one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassTarget {
    backend: Option<String>,
    /// Prefix forwarded streams with a PROXY v2 header.
    pub proxy_protocol: bool,
}

impl ClassTarget {
    /// An empty (or blank) backend address disables the class.
    pub fn new(backend: impl AsRef<str>, proxy_protocol: bool) -> Self {
        let backend = backend.as_ref().trim();
        Self {
            backend: (!backend.is_empty()).then(|| backend.to_string()),
            proxy_protocol,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }
}

/// Forwarding targets for every class. Fixed for the life of the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub http: ClassTarget,
    pub tls: ClassTarget,
    pub rest: ClassTarget,
}

impl Target {
    pub fn get(&self, class: Class) -> &ClassTarget {
        match class {
            Class::Http => &self.http,
            Class::Tls => &self.tls,
            Class::Rest => &self.rest,
        }
    }

    /// Classes with a backend, in matching priority order.
    pub fn enabled_classes(&self) -> Vec<Class> {
        Class::ALL
            .into_iter()
            .filter(|class| self.get(*class).is_enabled())
            .collect()
    }
}
