pub mod lifecycle;
pub mod notifier;
pub mod pix_gateway;
