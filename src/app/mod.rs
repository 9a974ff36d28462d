pub mod attachments;
pub mod auth;
pub mod categories;
pub mod comments;
pub mod demands;
pub mod moderation;
pub mod notifications;
pub mod posts;
pub mod users;
