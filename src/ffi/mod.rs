//! FFI (Foreign Function Interface) module for mobile platforms.
//!
//! This module provides a C-compatible ABI that can be called from:
//! - Kotlin/Java (Android) via JNI or direct NDK bindings, from a `VpnService`
//! - Swift (iOS) via direct C bindings, from a packet tunnel provider
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Mobile App                            │
//! │  ┌───────────────────────────────────────────┐           │
//! │  │  VpnService: protect(), establish(), ...  │           │
//! │  └────────▲──────────────────────────┬───────┘           │
//! │           │ callbacks                │ calls             │
//! │  ┌────────┴──────────────────────────▼───────┐           │
//! │  │              C FFI Layer                  │           │
//! │  │  - skywire_relay_create()                 │           │
//! │  │  - skywire_relay_start()                  │           │
//! │  │  - skywire_relay_stop()                   │           │
//! │  │  - skywire_relay_get_state()              │           │
//! │  │  - skywire_relay_destroy()                │           │
//! │  └────────────────────┬──────────────────────┘           │
//! │                       │                                  │
//! │  ┌────────────────────▼──────────────────────┐           │
//! │  │           Rust relay core                 │           │
//! │  │  - attempt/retry supervisor               │           │
//! │  │  - interface <-> UDP packet pumps         │           │
//! │  │  - Async runtime (tokio)                  │           │
//! │  └───────────────────────────────────────────┘           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage from Kotlin (Android)
//!
//! ```kotlin
//! external fun skywire_relay_create(config: SkywireRelayConfig, callbacks: SkywireCallbacks): Long
//! external fun skywire_relay_start(handle: Long): Int
//! external fun skywire_relay_stop(handle: Long): Int
//! external fun skywire_relay_destroy(handle: Long)
//! ```
//!
//! The `establish` callback returns the descriptor of the interface built
//! by the platform (`ParcelFileDescriptor.detachFd()` on Android); the relay
//! owns it from then on.

mod callbacks;
mod client;
mod types;

pub use callbacks::*;
pub use client::*;
pub use types::*;
