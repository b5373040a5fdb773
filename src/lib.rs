//! State-synchronization core of an MQTT operator console for the
//! Keithley 6517B electrometer.
//!
//! The instrument publishes telemetry and acknowledgements on
//! `{base}/response/{device}/...`, `{base}/connected/{device}` and
//! `{base}/error/{device}`; the console publishes commands on
//! `{base}/cmnd/{device}/...`. This crate owns everything between the broker
//! socket and the display surface:
//!
//! - [`mqtt`]: rumqttc transport task, forwarding broker traffic over
//!   channels.
//! - [`console::topic`]: the topic taxonomy and inbound classification.
//! - [`console::router`]: payload decoding and dispatch.
//! - [`console::state`]: the cached device state, link status, and the
//!   echo-suppressed push to the UI surface.
//! - [`console::command`]: user-intent encoding, gated by link status.
//!
//! The UI itself is a collaborator, not part of this crate: it implements
//! [`console::state::ConsoleSurface`] for display and calls
//! [`console::command::CommandPublisher`] methods on user edits. The shipped
//! binary wires a logging surface and a line-based operator shell instead of
//! a widget toolkit.

pub mod config;
pub mod console;
pub mod mqtt;
