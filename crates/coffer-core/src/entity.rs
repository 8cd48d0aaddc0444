//! The contract every stored record type satisfies.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A value type with a unique, deterministic primary key.
///
/// `id` must be a pure function of the value's fields: two equal values
/// always produce the same key, and the key never changes while the value
/// sits in a container.
///
/// # Examples
///
/// ```
/// use coffer_core::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct User {
///     name: String,
/// }
///
/// impl Entity for User {
///     type Key = String;
///
///     fn id(&self) -> String {
///         self.name.clone()
///     }
/// }
///
/// assert_eq!(User::name(), "User");
/// ```
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Primary key type
    type Key: Clone + Ord + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Extract the primary key
    fn id(&self) -> Self::Key;

    /// Directory name for this type under the storage root.
    ///
    /// Defaults to the unqualified Rust type name.
    fn name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Strip the module path from a fully qualified type name, leaving any
/// generic arguments untouched.
fn short_type_name(full: &'static str) -> &'static str {
    let base_end = full.find('<').unwrap_or(full.len());
    match full[..base_end].rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
