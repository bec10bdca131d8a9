pub mod failover;
pub mod suggestions;
pub mod topology;

// Re-export failover types
pub use failover::*;
// Re-export issue and suggestion types
pub use suggestions::*;
// Re-export topology types
pub use topology::*;
