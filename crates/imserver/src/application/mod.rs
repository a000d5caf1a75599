//! Application layer of the input-context broker.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The application layer sits between the shared wire/domain types in
//! `imserver_core` and the infrastructure (sockets, D-Bus, files). Code here:
//!
//! - **Orchestrates** connections, focus and widget state for the broker.
//! - **Depends on abstractions** (`ContextChannel`, `ToolbarRegistry`,
//!   `InputMethodTarget`, `ApplicationHost`) rather than concrete adapters.
//! - **Contains no OS calls, no network I/O, no file system access**.
//!
//! # Sub-modules
//!
//! - **`broker`** – The single-owner event loop ([`broker::InputContextBroker`])
//!   and its cloneable [`broker::BrokerHandle`].
//! - **`connection_registry`** – Identities and lifetimes of connections.
//! - **`active_context`** – Which connection owns focus, and the capability
//!   flags pushed to it.
//! - **`widget_state_store`** – Latest widget attribute snapshot.
//! - **`toolbar_bindings`** – Global toolbar ids and ownership checks.
//! - **`dispatcher`** – Server-to-client calls and deferred teardown.
//! - **`channel`**, **`targets`**, **`host`** – Collaborator traits.
//! - **`mock`** – Recording doubles used by the tests.

pub mod active_context;
pub mod broker;
pub mod channel;
pub mod connection_registry;
pub mod dispatcher;
pub mod host;
pub mod mock;
pub mod targets;
pub mod toolbar_bindings;
pub mod widget_state_store;
