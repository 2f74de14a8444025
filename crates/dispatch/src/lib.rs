mod graph;
mod processor;
mod traits;

pub use graph::{first_connected_account, ConnectedAccount, GraphConfig, GraphDispatcher, Page};
pub use processor::{EventProcessor, Outcome};
pub use traits::{Delivery, Dispatcher};
