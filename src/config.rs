//! Engine configuration

use crate::render::Encoding;

/// How service rows are authorized against a contact.
///
/// `Loose` also grants access through the service's host, `Strict` requires
/// the contact on the service itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationKind {
    Loose,
    Strict,
}

/// Static knobs of the engine, set once by the embedding daemon.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard cap on the size of one response body in bytes.
    pub max_response_size: usize,

    /// Text encoding assumed for blob payloads lifted into JSON/Python.
    /// Requests can override it per query with the `Encoding:` header.
    pub data_encoding: Encoding,

    /// Authorization mode for service rows.
    pub service_authorization: AuthorizationKind,

    /// Authorization mode for group rows. `Strict` requires the contact on
    /// every member, `Loose` on at least one.
    pub group_authorization: AuthorizationKind,

    /// Number of worker threads the server binary runs.
    pub num_client_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_response_size: 100 * 1024 * 1024,
            data_encoding: Encoding::Utf8,
            service_authorization: AuthorizationKind::Loose,
            group_authorization: AuthorizationKind::Strict,
            num_client_threads: 10,
        }
    }
}
