//! Concrete collaborators external to the core (§1 Non-goals): the
//! Gateway's API surface and the LLM backend substrates it wires through
//! the Provider Router.

pub mod gateway;
pub mod substrates;
