//! Links between business entities and folder bindings.

pub mod model;

pub use model::{BindingState, EntityFolderLink, EntityKind, EntityRef};
