pub mod invitation;
pub mod list;
pub mod notification;
pub mod subscription;
pub mod task;
pub mod user;
