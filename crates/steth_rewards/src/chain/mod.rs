pub mod cache;
pub mod chunked;
pub mod fetch;
pub mod normalize;
pub mod rpc;

pub use cache::{Cache, CacheError};
pub use chunked::request_with_block_step;
pub use fetch::{FetchConfig, FetchError, RebaseEntity, SubgraphClient, TransferEntity};
pub use normalize::{parse_block_spec, parse_time_rfc3339, NormalizeError};
pub use rpc::{search_block_at_or_before, RpcClient};
