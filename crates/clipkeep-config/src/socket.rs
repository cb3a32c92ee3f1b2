//! Where clients find the server.
//!
//! An endpoint is written either as a URL (`unix:///run/clipkeep.sock`,
//! `tcp://127.0.0.1:9474`) or, for Unix sockets, as a bare absolute path.

use std::fmt;
use std::fs::{self, DirBuilder};
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Server socket address.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Unix domain socket.
    Unix {
        /// Socket file.
        path: Utf8PathBuf,
    },
    /// TCP socket, meant for loopback addresses.
    Tcp {
        /// Host name or address.
        host: String,
        /// Port, never zero once parsed.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Unix endpoint at `path`.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// TCP endpoint at `host:port`.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Socket file path, `None` for TCP endpoints.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_path()),
            Self::Tcp { .. } => None,
        }
    }

    /// Creates the directory holding a Unix socket, private to the current
    /// user. TCP endpoints need nothing.
    ///
    /// # Errors
    ///
    /// Fails when the socket path has no parent, the parent exists but is not
    /// a directory, or it cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| SocketPreparationError::NoParent {
                path: path.to_owned(),
            })?;
        match fs::metadata(parent) {
            Ok(metadata) if metadata.is_dir() => return Ok(()),
            Ok(_) => {
                return Err(SocketPreparationError::NotADirectory {
                    path: parent.to_owned(),
                });
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(SocketPreparationError::CreateDirectory {
                    path: parent.to_owned(),
                    source,
                });
            }
        }
        private_dir_builder()
            .create(parent)
            .map_err(|source| SocketPreparationError::CreateDirectory {
                path: parent.to_owned(),
                source,
            })
    }
}

/// Recursive directory builder that creates directories only the current
/// user can enter.
pub(crate) fn private_dir_builder() -> DirBuilder {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.starts_with('/') {
            return Ok(Self::unix(input));
        }
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => {
                // `unix://run/x.sock` would parse "run" as a host and lose it.
                if url.host_str().is_some_and(|host| !host.is_empty()) {
                    return Err(SocketParseError::RelativeUnixPath(input.to_owned()));
                }
                match url.path() {
                    "" | "/" => Err(SocketParseError::MissingUnixPath(input.to_owned())),
                    path => Ok(Self::unix(path)),
                }
            }
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                match url.port() {
                    None | Some(0) => Err(SocketParseError::MissingPort(input.to_owned())),
                    Some(port) => Ok(Self::tcp(host, port)),
                }
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Rejected endpoint text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Neither `unix` nor `tcp`.
    #[error("unsupported socket scheme '{0}', expected unix or tcp")]
    UnsupportedScheme(String),
    /// TCP URL without a host.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// Port absent or zero.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// Unix URL without a path.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// Unix URL whose path starts in the host part.
    #[error("Unix socket path in '{0}' must be absolute, as in unix:///path")]
    RelativeUnixPath(String),
    /// Text that is not a URL or an absolute path.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Failures creating the socket directory.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// Bare file name without a directory.
    #[error("socket path '{path}' has no parent directory")]
    NoParent {
        /// Configured socket path.
        path: Utf8PathBuf,
    },
    /// Something other than a directory sits where the parent should be.
    #[error("socket directory '{path}' exists and is not a directory")]
    NotADirectory {
        /// Parent path.
        path: Utf8PathBuf,
    },
    /// The parent could not be inspected or created.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Parent path.
        path: Utf8PathBuf,
        /// Filesystem error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn temp_socket(dir: &tempfile::TempDir, relative: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(relative)).expect("utf8 path")
    }

    #[rstest]
    #[case("tcp://127.0.0.1:9000", SocketEndpoint::tcp("127.0.0.1", 9000))]
    #[case("unix:///run/user/1000/clipkeep/clipkeepd.sock", SocketEndpoint::unix("/run/user/1000/clipkeep/clipkeepd.sock"))]
    #[case("/tmp/clipkeepd.sock", SocketEndpoint::unix("/tmp/clipkeepd.sock"))]
    fn parses_endpoints(#[case] input: &str, #[case] expected: SocketEndpoint) {
        let endpoint: SocketEndpoint = input.parse().expect("endpoint should parse");
        assert_eq!(endpoint, expected);
    }

    #[rstest]
    #[case("http://localhost:80")]
    #[case("tcp://localhost")]
    #[case("tcp://localhost:0")]
    #[case("unix://")]
    #[case("clipkeepd.sock")]
    fn rejects_unusable_endpoints(#[case] input: &str) {
        assert!(input.parse::<SocketEndpoint>().is_err());
    }

    #[test]
    fn unix_urls_with_a_host_part_are_refused() {
        let error = "unix://run/clipkeepd.sock"
            .parse::<SocketEndpoint>()
            .expect_err("host part is not a path");
        assert!(matches!(error, SocketParseError::RelativeUnixPath(_)));
    }

    #[rstest]
    #[case(SocketEndpoint::unix("/tmp/clipkeepd.sock"))]
    #[case(SocketEndpoint::tcp("localhost", 9474))]
    fn display_text_parses_back(#[case] endpoint: SocketEndpoint) {
        let parsed: SocketEndpoint = endpoint.to_string().parse().expect("display output parses");
        assert_eq!(parsed, endpoint);
    }

    #[test]
    fn creates_missing_socket_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket = temp_socket(&dir, "nested/clipkeepd.sock");
        SocketEndpoint::unix(socket.clone())
            .prepare_filesystem()
            .expect("directory should be created");
        let parent = socket.parent().expect("parent");
        assert!(parent.is_dir());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(parent).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o077, 0, "socket directory open to others");
        }
    }

    #[test]
    fn file_in_place_of_the_directory_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("blocked"), b"").expect("write file");
        let error = SocketEndpoint::unix(temp_socket(&dir, "blocked/clipkeepd.sock"))
            .prepare_filesystem()
            .expect_err("file is not a directory");
        assert!(matches!(error, SocketPreparationError::NotADirectory { .. }));
    }

    #[test]
    fn tcp_endpoints_need_no_preparation() {
        SocketEndpoint::tcp("127.0.0.1", 9474)
            .prepare_filesystem()
            .expect("nothing to prepare");
    }
}
