mod file;
mod memory;
mod sqlite;

pub use file::{FilePolicyStore, StoredPolicy};
pub use memory::MemoryHistory;
pub use sqlite::SqlitePolicyStore;

use extguard_core::types::FixedExtension;
use extguard_core::{Policy, PolicyLimits};

/// Policy used to validate additions: only fixed names matter for the
/// reserved check, so their blocked state is left false.
fn reservation_policy(fixed: &[String], custom: Vec<String>, limits: PolicyLimits) -> Policy {
    Policy::new(
        fixed
            .iter()
            .map(|name| FixedExtension {
                extension: name.clone(),
                blocked: false,
            })
            .collect(),
        custom,
        limits,
    )
}
