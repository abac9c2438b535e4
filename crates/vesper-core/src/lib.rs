//! Vesper Core -- a process-oriented discrete-event simulation kernel.
//!
//! Simulated entities are *components* whose behavior is a [`component::Process`]
//! resumed by the [`engine::Environment`] whenever the component's next event
//! comes up. A process suspends itself by calling one of the primitives on
//! the environment:
//!
//! - [`hold`](engine::Environment::hold) for a span of virtual time,
//! - [`passivate`](engine::Environment::passivate) until someone activates it,
//! - [`standby`](engine::Environment::standby) until the next step,
//! - [`request`](engine::Environment::request) until resources are granted,
//! - [`wait`](engine::Environment::wait) until state predicates hold,
//! - [`join`](engine::Environment::join) until other components terminate,
//! - [`batch`](engine::Environment::batch) until a shared queue fills up.
//!
//! # Event order
//!
//! Events at distinct times are dispatched in increasing time order; events
//! at the same time by descending priority, then by insertion order. Urgent
//! events go ahead of everything else scheduled at the same time and
//! priority. With a fixed seed a model always produces the same trajectory,
//! which [`engine::Environment::fingerprint`] makes easy to check.
//!
//! ```rust,ignore
//! let mut env = Environment::with_seed(7);
//! let clerk = env.create_resource("clerk", 1.0)?;
//! env.spawn(
//!     "customer",
//!     Script::new()
//!         .then(move |env, me| env.request(me, Request::on(clerk)))
//!         .then(|env, me| env.hold(me, 5.0))
//!         .then(move |env, me| env.release(me, clerk, None)),
//! )?;
//! env.run()?;
//! ```
//!
//! # Key Types
//!
//! - [`engine::Environment`] -- Clock, event queue and run loop.
//! - [`component::Component`] -- Lifecycle record of a simulated entity.
//! - [`resource::Resource`] -- Capacity shared by claimers, with honor
//!   policies, preemption and depletable levels.
//! - [`state::State`] -- Typed value that components can wait on.
//! - [`queue::ComponentQueue`] -- Priority queue with length and
//!   length-of-stay statistics.
//! - [`coordination::SharedQueue`] -- Environment-owned waiting line that
//!   components can collect batches from.
//! - [`event::EventBus`] -- Buffered trace events with passive listeners.
//! - [`registry::Registry`] -- Type-keyed lookup of shared model objects.

pub mod component;
pub mod config;
pub mod coordination;
pub mod engine;
pub mod error;
pub mod event;
pub mod event_queue;
pub mod generator;
pub mod id;
pub mod lifecycle;
pub mod monitor;
pub mod query;
pub mod queue;
pub mod registry;
pub mod resource;
pub mod rng;
pub mod sim;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
