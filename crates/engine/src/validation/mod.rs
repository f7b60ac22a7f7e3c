pub mod index;
pub mod state;

pub use crate::store::ValidationPatch;
pub use index::ValidationIndex;
pub use state::{bulk_toggle_target, manual_edit, revert_to_original, toggle_status};
