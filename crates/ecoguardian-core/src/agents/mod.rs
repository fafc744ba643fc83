//! Mobile units: firefighting ground agents, roaming scouts and rescue units.

use slotmap::new_key_type;

mod ground;
mod rescue;
mod scout;

pub use ground::{GroundAgent, GroundStatus, StepContext, StepReport};
pub use rescue::RescueAgent;
pub use scout::Scout;

new_key_type! {
    /// Stable handle for ground agents backed by a generational slot map.
    pub struct GroundId;
}
