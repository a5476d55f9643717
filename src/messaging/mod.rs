pub mod event;
pub mod feed;
#[cfg(test)]
mod tests;

pub use event::{DetectionMessage, DetectionPhase, EventSnapshot};
pub use feed::FeedSubscriber;
