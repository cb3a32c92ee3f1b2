use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::{data_dir, runtime_dir};

use crate::socket::SocketEndpoint;

/// Default TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 9781;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default clipboard watcher executable, resolved through `PATH`.
pub const DEFAULT_WATCHER_PROGRAM: &str = "clipkeep-watch";

const APP_DIRECTORY: &str = "clipkeep";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Owned watcher program name.
pub fn default_watcher_program() -> String {
    DEFAULT_WATCHER_PROGRAM.to_owned()
}

/// Computes the default socket endpoint for the server.
pub fn default_socket_endpoint() -> SocketEndpoint {
    default_socket_endpoint_inner()
}

/// Computes the default data directory holding history, options and rules.
pub fn default_data_dir() -> Utf8PathBuf {
    #[cfg(unix)]
    {
        if let Some(mut base) = data_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
            base.push(APP_DIRECTORY);
            return base;
        }
        let mut base = fallback_base_directory();
        base.push(APP_DIRECTORY);
        base.push(user_namespace());
        base.push("data");
        base
    }

    #[cfg(not(unix))]
    {
        let mut base = fallback_base_directory();
        base.push(APP_DIRECTORY);
        base.push("data");
        base
    }
}

#[cfg(unix)]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push(APP_DIRECTORY);
    if apply_namespace {
        base.push(user_namespace());
    }

    let socket_path = base.join("clipkeepd.sock");
    SocketEndpoint::unix(socket_path)
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
pub(crate) fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
