//! Event partitioning for the parallel dispatch fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bail;
use crate::error::{ErrorKind, RelayResult};
use crate::types::{DbmsEvent, opts};

/// Routing decision produced by a partitioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionerResponse {
    /// Partition the event routes to.
    pub partition: u32,
    /// Whether the event must be serialized against every other partition.
    pub critical: bool,
}

impl PartitionerResponse {
    /// A non-critical routing to the given partition.
    pub fn normal(partition: u32) -> Self {
        Self {
            partition,
            critical: false,
        }
    }

    /// A critical routing to the given partition.
    pub fn critical(partition: u32) -> Self {
        Self {
            partition,
            critical: true,
        }
    }
}

/// Maps an event to a partition and a criticality flag.
///
/// Implementations must be pure: the decision may depend only on the event
/// and the task hint, never on external state. Fragments of one transaction
/// carry the same shard metadata and therefore route to the same partition.
pub trait Partitioner: Send + Sync {
    /// Computes the routing decision for an event.
    fn partition(&self, event: &DbmsEvent, task_hint: u32) -> RelayResult<PartitionerResponse>;
}

impl std::fmt::Debug for dyn Partitioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn Partitioner").finish()
    }
}

/// 64-bit FNV-1a hash, stable across platforms and toolchains.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

/// Default partitioner: hashes the shard metadata key modulo the partition
/// count.
///
/// Events without a shard id, and events tagged with the global shard marker,
/// affect every shard: they route to partition 0 and are flagged critical so
/// the dispatch queue serializes them against all partitions.
#[derive(Debug)]
pub struct ShardHashPartitioner {
    partitions: u32,
}

impl ShardHashPartitioner {
    pub fn new(partitions: u32) -> Self {
        Self { partitions }
    }
}

impl Partitioner for ShardHashPartitioner {
    fn partition(&self, event: &DbmsEvent, _task_hint: u32) -> RelayResult<PartitionerResponse> {
        match event.shard_id() {
            Some(shard) if shard != opts::GLOBAL_SHARD => {
                let partition = (fnv1a(shard.as_bytes()) % u64::from(self.partitions)) as u32;
                Ok(PartitionerResponse::normal(partition))
            }
            _ => Ok(PartitionerResponse::critical(0)),
        }
    }
}

/// Round-robins transactions over partitions by seqno; never critical.
#[derive(Debug)]
pub struct SeqnoPartitioner {
    partitions: u32,
}

impl SeqnoPartitioner {
    pub fn new(partitions: u32) -> Self {
        Self { partitions }
    }
}

impl Partitioner for SeqnoPartitioner {
    fn partition(&self, event: &DbmsEvent, _task_hint: u32) -> RelayResult<PartitionerResponse> {
        Ok(PartitionerResponse::normal(
            (event.seqno % u64::from(self.partitions)) as u32,
        ))
    }
}

/// Routes everything to partition 0; never critical.
#[derive(Debug)]
pub struct SinglePartitioner;

impl Partitioner for SinglePartitioner {
    fn partition(&self, _event: &DbmsEvent, _task_hint: u32) -> RelayResult<PartitionerResponse> {
        Ok(PartitionerResponse::normal(0))
    }
}

/// Factory function building a partitioner for a given partition count.
pub type PartitionerFactory = Arc<dyn Fn(u32) -> Arc<dyn Partitioner> + Send + Sync>;

/// Registry resolving symbolic partitioner names to factories.
///
/// Replaces class-name-driven loading with a closed set of built-ins plus a
/// registration hook for embedders.
pub struct PartitionerRegistry {
    factories: HashMap<String, PartitionerFactory>,
}

impl PartitionerRegistry {
    /// Name of the default shard-hash partitioner.
    pub const SHARD_HASH: &'static str = "shard-hash";

    /// Name of the seqno round-robin partitioner.
    pub const SEQNO: &'static str = "seqno";

    /// Name of the single-partition partitioner.
    pub const SINGLE: &'static str = "single";

    /// Creates a registry with the built-in partitioners preregistered.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };

        registry.register(Self::SHARD_HASH, |partitions| {
            Arc::new(ShardHashPartitioner::new(partitions))
        });
        registry.register(Self::SEQNO, |partitions| {
            Arc::new(SeqnoPartitioner::new(partitions))
        });
        registry.register(Self::SINGLE, |_| Arc::new(SinglePartitioner));

        registry
    }

    /// Associates a symbolic name with a partitioner factory.
    ///
    /// Registering an existing name replaces the previous factory.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(u32) -> Arc<dyn Partitioner> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    /// Builds the partitioner registered under `name` for the given partition
    /// count.
    pub fn build(&self, name: &str, partitions: u32) -> RelayResult<Arc<dyn Partitioner>> {
        let Some(factory) = self.factories.get(name) else {
            bail!(
                ErrorKind::UnknownPartitioner,
                "No partitioner registered under this name",
                format!("name={name}")
            );
        };

        Ok(factory(partitions))
    }
}

impl Default for PartitionerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{event_with_shard, transaction};

    #[test]
    fn shard_hash_is_stable_and_in_range() {
        let partitioner = ShardHashPartitioner::new(4);
        let event = event_with_shard(1, "tenant-42");

        let first = partitioner.partition(&event, 0).unwrap();
        let second = partitioner.partition(&event, 3).unwrap();

        assert_eq!(first, second);
        assert!(first.partition < 4);
        assert!(!first.critical);
    }

    #[test]
    fn different_shards_spread_over_partitions() {
        let partitioner = ShardHashPartitioner::new(8);

        let mut seen = std::collections::HashSet::new();
        for shard in 0..64 {
            let event = event_with_shard(shard, &format!("tenant-{shard}"));
            let response = partitioner.partition(&event, 0).unwrap();
            seen.insert(response.partition);
        }

        assert!(seen.len() > 1);
    }

    #[test]
    fn missing_shard_is_critical_on_partition_zero() {
        let partitioner = ShardHashPartitioner::new(4);
        let event = transaction(9);

        let response = partitioner.partition(&event, 0).unwrap();

        assert_eq!(response, PartitionerResponse::critical(0));
    }

    #[test]
    fn global_shard_marker_is_critical() {
        let partitioner = ShardHashPartitioner::new(4);
        let event = event_with_shard(9, opts::GLOBAL_SHARD);

        let response = partitioner.partition(&event, 0).unwrap();

        assert!(response.critical);
        assert_eq!(response.partition, 0);
    }

    #[test]
    fn seqno_partitioner_round_robins() {
        let partitioner = SeqnoPartitioner::new(3);

        for seqno in 0..9 {
            let event = transaction(seqno);
            let response = partitioner.partition(&event, 0).unwrap();
            assert_eq!(u64::from(response.partition), seqno % 3);
            assert!(!response.critical);
        }
    }

    #[test]
    fn registry_builds_builtins_and_rejects_unknown_names() {
        let registry = PartitionerRegistry::with_builtins();

        registry
            .build(PartitionerRegistry::SHARD_HASH, 4)
            .unwrap();
        registry.build(PartitionerRegistry::SINGLE, 1).unwrap();

        let error = registry.build("load-balanced", 4).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnknownPartitioner);
    }

    #[test]
    fn registry_accepts_custom_factories() {
        let mut registry = PartitionerRegistry::with_builtins();
        registry.register("always-two", |_| {
            struct AlwaysTwo;
            impl Partitioner for AlwaysTwo {
                fn partition(
                    &self,
                    _event: &DbmsEvent,
                    _task_hint: u32,
                ) -> RelayResult<PartitionerResponse> {
                    Ok(PartitionerResponse::normal(2))
                }
            }
            Arc::new(AlwaysTwo)
        });

        let partitioner = registry.build("always-two", 4).unwrap();
        let response = partitioner.partition(&transaction(1), 0).unwrap();

        assert_eq!(response.partition, 2);
    }
}
