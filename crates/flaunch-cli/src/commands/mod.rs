pub mod daemon;
pub mod stream;
pub mod watch;
