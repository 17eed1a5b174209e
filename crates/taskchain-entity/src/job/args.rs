//! The contract between a payload type and its job kind.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A serializable job payload identified by a stable kind string.
///
/// The kind is what the worker registry routes on, so it must never change
/// once jobs of that kind may exist in a queue.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use taskchain_entity::JobArgs;
///
/// #[derive(Serialize, Deserialize)]
/// struct ResizeArgs {
///     width: u32,
/// }
///
/// impl JobArgs for ResizeArgs {
///     const KIND: &'static str = "resize";
/// }
///
/// assert_eq!(ResizeArgs::KIND, "resize");
/// ```
pub trait JobArgs: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable, process-wide-unique kind name.
    const KIND: &'static str;
}
