//! Client-side reconcilers. Each one is owned by a single task, either a
//! request handler or an SSE stream, and needs no locking.

pub mod notifications;
pub mod reducer;
pub mod tasks;
