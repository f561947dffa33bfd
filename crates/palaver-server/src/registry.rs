//! Client registry: handle → identity mapping.
//!
//! One identity per live connection, keyed by the connection handle. The
//! registry owns the identity lifecycle: created at accept time with a
//! synthesized default name, mutated only by a successful rename,
//! destroyed when the connection is unregistered.
//!
//! Membership here must stay in lock-step with the poller's watch set;
//! the runtime keeps that invariant by registering and watching (and
//! unregistering and unwatching) in adjacent steps.

use std::{collections::HashMap, fmt};

use palaver_proto::MAX_NAME_LEN;
use thiserror::Error;

/// Opaque identifier for one accepted connection.
///
/// Handles come from a monotonically increasing counter, so a handle is
/// never reused for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

impl Handle {
    /// Create a handle from its raw token value.
    #[must_use]
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    /// The raw token value.
    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from registry operations.
///
/// Both variants are recovered locally by the caller: the offending
/// frame or event is logged and dropped, never propagated as a crash.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Operation on a handle that is not registered.
    #[error("unknown client: handle {0}")]
    UnknownClient(Handle),

    /// Registration of a handle that is already registered. Handles are
    /// never reused, so this indicates a defect rather than a runtime
    /// condition.
    #[error("client already registered: handle {0}")]
    AlreadyRegistered(Handle),
}

/// Server-side record of a client's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The connection this identity belongs to.
    pub handle: Handle,
    /// Display name, at most [`MAX_NAME_LEN`] bytes.
    pub name: String,
}

/// Mapping from connection handle to client identity.
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<Handle, Identity>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client with the default name `User<handle>`.
    pub fn register(&mut self, handle: Handle) -> Result<&Identity, RegistryError> {
        if self.clients.contains_key(&handle) {
            return Err(RegistryError::AlreadyRegistered(handle));
        }
        let identity = Identity { handle, name: format!("User{handle}") };
        Ok(self.clients.entry(handle).or_insert(identity))
    }

    /// Overwrite a client's name, returning `(old, new)` for the caller
    /// to format a notification.
    ///
    /// The name is silently truncated to [`MAX_NAME_LEN`] bytes. No
    /// uniqueness constraint exists; two clients may share a name.
    pub fn rename(
        &mut self,
        handle: Handle,
        new_name: &str,
    ) -> Result<(String, String), RegistryError> {
        let identity =
            self.clients.get_mut(&handle).ok_or(RegistryError::UnknownClient(handle))?;
        let new_name = truncate_name(new_name);
        let old_name = std::mem::replace(&mut identity.name, new_name.clone());
        Ok((old_name, new_name))
    }

    /// Remove and return a client's identity.
    ///
    /// Idempotency is the caller's responsibility: this must be called at
    /// most once per handle lifecycle.
    pub fn unregister(&mut self, handle: Handle) -> Result<Identity, RegistryError> {
        self.clients.remove(&handle).ok_or(RegistryError::UnknownClient(handle))
    }

    /// Look up a client's identity.
    pub fn lookup(&self, handle: Handle) -> Result<&Identity, RegistryError> {
        self.clients.get(&handle).ok_or(RegistryError::UnknownClient(handle))
    }

    /// Snapshot of all registered handles in ascending order.
    ///
    /// The snapshot is owned, so it stays stable for the duration of one
    /// broadcast pass even if the registry is mutated afterwards.
    #[must_use]
    pub fn handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.clients.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    /// Whether a handle is registered.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.clients.contains_key(&handle)
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Truncate a name to [`MAX_NAME_LEN`] bytes at a character boundary.
fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_owned();
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_synthesizes_default_name() {
        let mut registry = Registry::new();
        let identity = registry.register(Handle::new(4)).unwrap();
        assert_eq!(identity.name, "User4");
        assert_eq!(identity.handle, Handle::new(4));
    }

    #[test]
    fn register_duplicate_handle_fails() {
        let mut registry = Registry::new();
        registry.register(Handle::new(1)).unwrap();
        assert_eq!(
            registry.register(Handle::new(1)),
            Err(RegistryError::AlreadyRegistered(Handle::new(1)))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rename_returns_old_and_new() {
        let mut registry = Registry::new();
        registry.register(Handle::new(2)).unwrap();

        let (old, new) = registry.rename(Handle::new(2), "Bob").unwrap();
        assert_eq!(old, "User2");
        assert_eq!(new, "Bob");
        assert_eq!(registry.lookup(Handle::new(2)).unwrap().name, "Bob");
    }

    #[test]
    fn rename_truncates_long_names() {
        let mut registry = Registry::new();
        registry.register(Handle::new(1)).unwrap();

        let (_, new) = registry.rename(Handle::new(1), "Bartholomew").unwrap();
        assert_eq!(new, "Bartholo");
    }

    #[test]
    fn rename_unknown_handle_fails() {
        let mut registry = Registry::new();
        assert_eq!(
            registry.rename(Handle::new(9), "Bob"),
            Err(RegistryError::UnknownClient(Handle::new(9)))
        );
    }

    #[test]
    fn names_need_not_be_unique() {
        let mut registry = Registry::new();
        registry.register(Handle::new(1)).unwrap();
        registry.register(Handle::new(2)).unwrap();

        registry.rename(Handle::new(1), "Bob").unwrap();
        registry.rename(Handle::new(2), "Bob").unwrap();

        assert_eq!(registry.lookup(Handle::new(1)).unwrap().name, "Bob");
        assert_eq!(registry.lookup(Handle::new(2)).unwrap().name, "Bob");
    }

    #[test]
    fn unregister_returns_identity_exactly_once() {
        let mut registry = Registry::new();
        registry.register(Handle::new(3)).unwrap();

        let identity = registry.unregister(Handle::new(3)).unwrap();
        assert_eq!(identity.name, "User3");
        assert_eq!(
            registry.unregister(Handle::new(3)),
            Err(RegistryError::UnknownClient(Handle::new(3)))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn handles_snapshot_is_sorted() {
        let mut registry = Registry::new();
        for value in [5, 1, 3] {
            registry.register(Handle::new(value)).unwrap();
        }
        assert_eq!(
            registry.handles(),
            vec![Handle::new(1), Handle::new(3), Handle::new(5)]
        );
    }
}
