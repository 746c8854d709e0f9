//! Broker connection-admission and handler-registry core.
//!
//! Every app opens one bidirectional RSocket session to the broker. This
//! crate gates each incoming session (parse → authenticate → validate →
//! uniqueness → enrich → construct → register), owns the directory of live
//! responder handlers, and fans lifecycle and cluster-topology events out to
//! connected apps.
//!
//! The surrounding broker (frame codec, token verification, routing tables,
//! cluster membership discovery) is reached only through the collaborator
//! contracts in [`services`].

pub mod admission;
pub mod auth;
pub mod broadcast;
pub mod cluster;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod handler;
pub mod registry;
pub mod services;
pub mod socket;
pub mod sweep;

pub use {
    admission::{accept, derive_instance_id},
    auth::{AUTH_METHOD_JWT, AuthenticationService, Principal},
    broadcast::broadcast,
    cluster::spawn_cluster_announcer,
    config::RegistryConfig,
    error::AdmissionError,
    events::EventBus,
    handler::{ROLE_CONSUMER, ROLE_PUBLISHER, ResponderHandler},
    registry::HandlerRegistry,
    services::{
        BrokerInfo, BrokerManager, FilterChain, FilterRejected, LocalServiceCaller,
        RegistryServices, ServiceMeshInspector, ServiceRoutingSelector,
    },
    socket::RequesterSocket,
    sweep::spawn_stale_sweeper,
};
