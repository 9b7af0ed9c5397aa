//! Request-scoped operations over a `Gateway`. Each function validates its
//! input first, so a rejected request never reaches the platform.

pub mod auth;
pub mod invitation;
pub mod lists;
pub mod subscription;
pub mod tasks;
