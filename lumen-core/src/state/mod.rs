pub mod phase;
mod stage;

pub use phase::SessionPhase;
pub use stage::Stage;
