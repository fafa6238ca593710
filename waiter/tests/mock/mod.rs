/*!

Mock implementations of the [`Connector`], [`Connection`] and [`RestApi`] traits so that the
waiters can be tested without guests or a cloud. The SSH mocks charge their pretend network time
to a [`ManualClock`] shared with the awaiter under test, so deadlines pass without real sleeping.

!*/

pub(crate) mod connector;
pub(crate) mod rest_api;
