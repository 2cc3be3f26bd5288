pub mod common;

// Re-export commonly used items
pub use common::MessageRecord;
