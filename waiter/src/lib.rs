/*!

`kong-waiter` provides the waiting primitives used by the Kong integration tests: a bounded
polling loop for asynchronous resource state, a calculator for server-requested rate-limit
backoff, and an awaiter that retries SSH connections to guests that may not be reachable yet.

The HTTP and SSH collaborators these primitives are consumed by live here as well, behind the
[`RestApi`] and [`Connector`] traits, so that tests can swap in mocks and a [`ManualClock`]
instead of a live deployment and real sleeping.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BoxError, Error, Result};
pub use poll::{call_until_true, poll, CondCheckError, PollOutcome, PollPolicy, Poller};
pub use rest::{is_absolute_limit, Response, RestApi, RestClient};
pub use retry_after::{compute_delay, compute_delay_from_pairs};
pub use ssh::{
    CommandOutput, ConnectError, Connection, ConnectionAwaiter, ConnectionSpec, Connector,
    Credential, OpensshConnection, OpensshConnector,
};
pub use status::{classify_status, wait_for_deletion, wait_for_status, StatusQuery};

mod clock;
pub mod constants;
mod error;
mod poll;
mod rest;
mod retry_after;
pub mod ssh;
mod status;
