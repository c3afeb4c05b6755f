//! Transfer orchestration.
//!
//! A transfer takes a linear chain of elements, settles on one data
//! movement mechanism per edge, and runs worker threads until the
//! stream drains. The caller interacts with the [`Transfer`] before
//! start and with the [`TransferHandle`] after; either side can
//! [`subscribe`](Transfer::subscribe) to the event feed.

mod events;
mod negotiate;
mod transfer;

pub use events::{EventReceiver, EventSender, XferEvent};
pub use transfer::{Transfer, TransferHandle, TransferRef, TransferState};
