//! Infrastructure layer of the input-context broker.
//!
//! Contains OS-facing adapters: the private Unix socket transport, the
//! session-bus activation object, configuration file storage, and the
//! default toolbar registry, target and host used by the headless binary.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `imserver_core`, but MUST NOT be imported by the `application` layer.

pub mod logging_target;
pub mod network;
pub mod storage;
pub mod toolbar_registry;
