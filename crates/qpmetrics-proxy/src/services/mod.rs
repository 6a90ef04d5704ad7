//! Built-in upstream handlers.

pub mod echo;

pub use echo::EchoHandler;
