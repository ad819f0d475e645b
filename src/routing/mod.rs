pub mod decision;
pub mod key_range;
pub mod keyspace_id;
pub mod resolver;

pub use decision::{EntityLookup, OperationKind, RoutingDecision, ShardingScheme};
pub use key_range::KeyRange;
pub use keyspace_id::{KEYSPACE_ID_WIDTH, KeyspaceId, pack_keyspace_id, unpack_keyspace_id};
pub use resolver::{EntityRef, RoutingParams, ShardResolver, single_shard_key};
