pub mod audit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod judge;
pub mod metrics;
pub mod observed;
pub mod store;
pub mod types;
pub mod validator;

pub use error::PolicyError;
pub use observed::ObservedPolicyStore;
pub use store::{HistoryStore, PolicyStore, UploadJudge};
pub use types::{
    ApiResponse, Classification, FixedExtension, Policy, PolicyLimits, UploadRecord,
    UploadRequest,
};
