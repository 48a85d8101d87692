//! Advice attached to risky commands: safer rewrites and backup steps.
//!
//! Both advisors are driven by the classifier's findings, so a suggestion is
//! only made for a category that actually matched.

pub mod alternatives;
pub mod backup;

pub use alternatives::suggest;
pub use backup::recommend;
