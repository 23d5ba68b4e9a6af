// ABOUTME: Platform adapters and the registry that runs them together
// ABOUTME: Only the local console ships here; chat services plug in through the same trait

pub mod console;
pub mod registry;

pub use console::ConsoleAdapter;
pub use registry::PlatformRegistry;
