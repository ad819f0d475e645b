pub mod config;
pub mod policy;
pub mod registry;
pub mod table;

pub use config::{LookupConfig, RegistryConfig, TableConfig};
pub use policy::{ShardKeyPolicy, ShardKeyTransform, fnv1a_64};
pub use registry::TableRegistry;
pub use table::{LookupBinding, TableDescriptor, TableDescriptorBuilder};
