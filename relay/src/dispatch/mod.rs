//! Parallel dispatch: fans a totally-ordered event stream out to N
//! partition consumers while serializing critical sections.

mod critical;
mod partitioner;
mod queue;
mod reader;

pub use critical::{CriticalSection, CriticalSectionTracker};
pub use partitioner::{
    Partitioner, PartitionerFactory, PartitionerRegistry, PartitionerResponse,
    SeqnoPartitioner, ShardHashPartitioner, SinglePartitioner,
};
pub use queue::ParallelDispatchQueue;
pub use reader::{PartitionReader, PartitionSender, create_partition_lane};
