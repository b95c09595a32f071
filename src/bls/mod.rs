pub mod mock;
pub mod noop;
pub mod variant;

pub use mock::{InitializedTask, MockBlsService};
pub use noop::NoopBlsService;
pub use variant::BlsServiceVariant;
