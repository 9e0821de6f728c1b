//! ICMP reachability probing.
//!
//! - [`IcmpPinger`]: [`Pinger`](crate::collector::Pinger) backed by `surge-ping`

mod pinger;

pub use pinger::{IcmpPinger, PingConfig};
