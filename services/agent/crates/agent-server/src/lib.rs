//! ServerSpy agent: receives task triggers over HTTP, fetches the task
//! from the control API, performs it and answers with a JSON result.

pub mod api;
pub mod handlers;
pub mod pipeline;
pub mod server;
pub mod state;
pub mod upload;
