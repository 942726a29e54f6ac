//! Priority failover routing.
//!
//! A [`RouteRequest`] carries its candidate endpoints in priority order. The
//! [`Router`] forwards to them one at a time:
//!
//! | Outcome | Metrics | Next step |
//! |---------|---------|-----------|
//! | 200, any body | `record_success(tokens, latency)` | return the response |
//! | 429 | `record_failure(Some(429))` | next endpoint, remember `retry-after` |
//! | other status | `record_failure(Some(status))` | next endpoint, or surface it (policy) |
//! | transport error | `record_failure(None)` | next endpoint |
//!
//! When the list runs out the caller gets a 503 with a fixed
//! `{ endpoint, date, err_msg }` body.

pub mod descriptor;
pub mod outcome;
pub mod router;

pub use descriptor::{EndpointDescriptor, RouteRequest};
pub use outcome::{usage_tokens, AttemptOutcome};
pub use router::{ExhaustionBody, RouteResponse, Router, EXHAUSTED_MESSAGE, EXHAUSTED_STATUS};
