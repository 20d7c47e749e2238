use std::fmt;

use super::net::Net;

/// Possible errors returned by the fallible methods on a RIB.
///
/// Note that routes that are refused by the update path (bogus prefixes,
/// filtered routes, routes from protocols that are not up) are NOT errors:
/// they are logged and counted, but never returned to the caller. Broken
/// internal invariants are not errors either, they panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RibError {
    /// The net is not a valid prefix, i.e. it has bits set beyond its
    /// length, or its length does not fit the address family.
    InvalidNet(Net),
    /// The string could not be parsed as `address/length`.
    ParseNet(String),
    /// There is no table with this name, or this table id is unknown.
    TableNotFound(String),
    /// There is no protocol with this name, or this protocol id is
    /// unknown.
    ProtocolNotFound(String),
    /// The announce hook does not exist (anymore).
    HookNotFound,
    /// A table or protocol with this name already exists.
    DuplicateName(String),
    /// The protocol is already connected to the table.
    AlreadyConnected(String),
    /// The configuration could not be parsed or is inconsistent.
    Config(String),
}

impl std::error::Error for RibError {}

impl fmt::Display for RibError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RibError::InvalidNet(net) => {
                write!(f, "Error: {} is not a valid prefix.", net)
            }
            RibError::ParseNet(s) => {
                write!(f, "Error: cannot parse '{}' as a network.", s)
            }
            RibError::TableNotFound(name) => {
                write!(f, "Error: table '{}' does not exist.", name)
            }
            RibError::ProtocolNotFound(name) => {
                write!(f, "Error: protocol '{}' does not exist.", name)
            }
            RibError::HookNotFound => {
                write!(f, "Error: the announce hook does not exist.")
            }
            RibError::DuplicateName(name) => {
                write!(f, "Error: the name '{}' is already in use.", name)
            }
            RibError::AlreadyConnected(name) => write!(
                f,
                "Error: protocol '{}' is already connected to this table.",
                name
            ),
            RibError::Config(msg) => {
                write!(f, "Error: invalid configuration: {}", msg)
            }
        }
    }
}

impl From<serde_json::Error> for RibError {
    fn from(value: serde_json::Error) -> Self {
        RibError::Config(value.to_string())
    }
}
