pub mod board;
pub mod deadline;
pub mod filter;
pub mod partition;
pub mod priority;
pub mod work_item;

pub use board::{
    AggregateResult, BoardView, Card, ContainerOperation, ItemOperation, PartitionContainer,
    UserInfo,
};
pub use deadline::{DeadlineWindow, ExpireType};
pub use filter::{Filter, Scope, DEFAULT_PAGE_SIZE};
pub use partition::{BoardKind, Partition, PartitionKey, PartitionKeyId};
pub use priority::Priority;
pub use work_item::{Label, StateBelong, TransitionButton, WorkItem};
