//! A small HTTP server that stands in for the Stripe API in tests. It
//! answers every request with one canned response, counts what it
//! receives, and also works as the target of a proxied request.

mod server;

pub use server::*;
