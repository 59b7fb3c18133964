//! Channel bridge between a local chat platform and a remote one.
//!
//! The [`service::BridgeService`] owns the durable link registry, the message
//! ID translator and the subscription manager, and hands inbound events from
//! either platform to the [`engine::BridgeEngine`]. Both platforms are reached
//! only through the [`remote::RemoteClient`] and [`local::LocalPlatform`]
//! capability traits.

pub mod commands;
pub mod engine;
pub mod error;
pub mod events;
pub mod links;
pub mod local;
pub mod notification;
pub mod remote;
pub mod renewal;
pub mod service;
pub mod subscriptions;
pub mod translator;

#[cfg(test)]
pub(crate) mod test_support;

pub use {
    commands::{BridgeCommand, CommandContext, CommandResponse},
    engine::{AntiEchoMarker, BridgeEngine},
    error::{Error, Result},
    events::{BridgeEvent, BridgeEventSink},
    local::{LocalError, LocalPlatform},
    notification::{ChangeNotification, NotificationBatch},
    remote::{RemoteClient, RemoteError},
    service::{BridgeHealth, BridgeService},
    subscriptions::{SubscriptionManager, SubscriptionStatus},
};
