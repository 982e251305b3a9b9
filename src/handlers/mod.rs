pub mod donations;
pub mod webhooks;
