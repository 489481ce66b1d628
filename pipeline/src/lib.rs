pub mod background;
pub mod capture;
pub mod filter;
pub mod mailbox;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod transform;
