pub mod constants;
pub mod metadata;
pub mod namespace;
pub mod plugin;

pub use metadata::{MetadataUpdate, parse_metadata, structurally_equal};
pub use namespace::{InvalidNamespace, Namespace};
pub use plugin::{InvalidPlugin, MetadataPlugin};
