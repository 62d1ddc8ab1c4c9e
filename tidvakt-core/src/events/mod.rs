//! ## tidvakt-core::events
//! **Raw kernel records and the downstream delivery contract**
//!
//! ### Expectations (Production):
//! - Header parsing never allocates and never panics on short input
//! - The handler sees a borrowed payload and copies what it keeps
//!
//! ### Key Submodules:
//! - `record/`: Raw record, Quick Info and the event wire header
//! - `handler/`: Downstream handler trait

pub mod handler;
pub mod record;

pub use handler::EventHandler;
pub use record::{EventHeader, QuickInfo, RawRecord, HEADER_LEN, QUICK_INFO_LEN};
