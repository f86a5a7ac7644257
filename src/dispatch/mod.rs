//! Dispatch module for handing hotkey notifications to the consumer loop
//!
//! The listener thread only ever touches the [`DispatchBridge`]; the
//! registered callback lives in the consumer-owned [`Dispatcher`].

mod bridge;

pub use bridge::{DispatchBridge, Dispatcher};
