pub mod pool_refresher;
pub mod result_cleanup;

pub use pool_refresher::{CandidateSource, FileCandidateSource, PoolRefresher, PoolRefresherHandle};
pub use result_cleanup::{ResultCleanupConfig, ResultCleanupHandle, ResultCleanupService};
