pub mod audit;
pub mod error;
pub mod normalize;
pub mod random;
pub mod traits;
pub mod types;

pub use audit::*;
pub use error::*;
pub use normalize::{bot_id_for, Normalized, SchemaRepair};
pub use random::{ScriptedRandom, SeededRandom};
pub use traits::*;
pub use types::*;
