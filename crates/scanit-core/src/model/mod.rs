pub mod finding;
pub mod key;
pub mod version;

pub use finding::{Issue, IssueFilter, IssueScope, Measure, QualityProfileBinding};
pub use key::ProjectKey;
pub use version::ServiceVersion;
