//! # Ember Discovery
//!
//! Peer discovery for the Ember peer-to-peer messenger.
//!
//! This crate provides:
//! - A local-link UDP broadcaster/listener advertising a fixed rendezvous
//!   tag ([`broadcast`])
//! - An on-demand DHT-style rendezvous and content-provider directory
//!   ([`dht`])
//! - NAT type detection, STUN, ICE candidate gathering, and UDP hole
//!   punching ([`nat`])
//! - DERP-style relay client/server fallback ([`relay`])
//! - [`manager::DiscoveryManager`], which runs the above and implements
//!   `ember_core`'s `DiscoveryHandle` trait

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broadcast;
pub mod dht;
pub mod manager;
pub mod nat;
pub mod relay;
